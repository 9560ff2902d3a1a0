//! Relational compiler
//!
//! A request compiles to a handful of independent statements, each tagged
//! with its purpose so the caller can hand back the rows of each one.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::aggregations::{computation_columns, level_statement, where_clause, TOTAL_COLUMN};
use super::predicate::{keyset_sql, sort_expression};
use super::writer::{quote, SqlWriter};
use crate::errors::ExploreResult;
use crate::model::{ComputationMetric, DEFAULT_PAGE_SIZE};
use crate::planner::{
    check_computation, parse_cursor, parse_sort, AggregationPlan, Capabilities, CompilerContext,
    ConditionGroup, ConditionSet, QueryCompiler, Scalar, SortKey,
};

/// Statement counting the matching rows
pub const COUNT_STATEMENT: &str = "count";
/// Statement returning a page of rows
pub const HITS_STATEMENT: &str = "hits";
/// Statement returning a computation
pub const COMPUTATION_STATEMENT: &str = "computation";

/// Column holding the GeoJSON of the record geometry
pub const GEOMETRY_COLUMN: &str = "_geometry";
/// Column holding the GeoJSON of the record centroid
pub const CENTROID_COLUMN: &str = "_centroid";

/// Name of the statement returning the buckets of level `depth`
pub fn level_statement_name(depth: usize) -> String {
    format!("level_{}", depth)
}

/// Column holding the value of sort key `index`
pub fn sort_column(index: usize) -> String {
    format!("_sort_{}", index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    pub purpose: String,
    pub sql: String,
    pub params: Vec<Scalar>,
}

/// Statements against one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlPlan {
    pub table: String,
    pub statements: Vec<SqlStatement>,
}

impl SqlPlan {
    pub fn statement(&self, purpose: &str) -> Option<&SqlStatement> {
        self.statements.iter().find(|s| s.purpose == purpose)
    }
}

enum Request {
    Hits,
    Aggregation(AggregationPlan),
    Computation {
        field: String,
        metric: ComputationMetric,
    },
}

/// Accumulates a relational request
pub struct SqlCompiler {
    context: CompilerContext,
    filters: ConditionSet,
    size: usize,
    from: usize,
    sort: Vec<SortKey>,
    after: Option<(Vec<SortKey>, Vec<Scalar>)>,
    request: Request,
}

impl SqlCompiler {
    pub fn new(context: CompilerContext) -> Self {
        Self {
            context,
            filters: ConditionSet::new(),
            size: DEFAULT_PAGE_SIZE,
            from: 0,
            sort: Vec::new(),
            after: None,
            request: Request::Hits,
        }
    }

    fn table(&self) -> &str {
        &self.context.collection.index_name
    }

    /// `SELECT ... FROM table WHERE filters AND extra ...`; `writer` already
    /// holds the parameters of `extra`
    fn statement(
        &self,
        purpose: &str,
        select: &[String],
        extra: &[String],
        mut writer: SqlWriter,
        suffix: &str,
    ) -> ExploreResult<SqlStatement> {
        let where_sql = where_clause(&self.filters, extra, &mut writer)?;
        Ok(SqlStatement {
            purpose: purpose.to_string(),
            sql: format!(
                "SELECT {} FROM {}{}{}",
                select.join(", "),
                quote(self.table()),
                where_sql,
                suffix
            ),
            params: writer.into_params(),
        })
    }

    fn count_statement(&self) -> ExploreResult<SqlStatement> {
        self.statement(
            COUNT_STATEMENT,
            &[format!("COUNT(*) AS {}", quote(TOTAL_COLUMN))],
            &[],
            SqlWriter::new(),
            "",
        )
    }

    fn hits_statement(&self) -> ExploreResult<SqlStatement> {
        let collection = &self.context.collection;
        let centroid = collection.centroid_path.as_str();

        let mut writer = SqlWriter::new();
        let mut extra = Vec::new();
        if let Some((keys, values)) = &self.after {
            extra.push(keyset_sql(keys, values, centroid, &mut writer));
        }

        let mut select = vec![
            "*".to_string(),
            format!(
                "ST_AsGeoJSON({}) AS {}",
                quote(&collection.geometry_path),
                quote(GEOMETRY_COLUMN)
            ),
            format!(
                "ST_AsGeoJSON({}) AS {}",
                quote(centroid),
                quote(CENTROID_COLUMN)
            ),
        ];
        let mut order_by = Vec::new();
        for (i, key) in self.sort.iter().enumerate() {
            let expression = sort_expression(key, centroid);
            select.push(format!("{} AS {}", expression, quote(&sort_column(i))));
            let direction = if key.is_descending() { "DESC" } else { "ASC" };
            order_by.push(format!("{} {}", expression, direction));
        }
        if order_by.is_empty() {
            order_by.push(format!("{} ASC", quote(&collection.id_path)));
        }

        let mut suffix = format!(" ORDER BY {} LIMIT {}", order_by.join(", "), self.size);
        if self.from > 0 {
            suffix.push_str(&format!(" OFFSET {}", self.from));
        }
        self.statement(HITS_STATEMENT, &select, &extra, writer, &suffix)
    }
}

impl QueryCompiler for SqlCompiler {
    type Plan = SqlPlan;

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            raw_geometries: false,
            fetch_hits: false,
            unscoped_full_text: false,
            tracks_other_doc_count: false,
        }
    }

    fn context(&self) -> &CompilerContext {
        &self.context
    }

    fn push_group(&mut self, group: ConditionGroup) {
        self.filters.add(group);
    }

    fn filter_size(&mut self, size: usize, from: usize) {
        self.size = size;
        self.from = from;
    }

    fn sort(&mut self, sort: &str) -> ExploreResult<()> {
        self.sort = parse_sort(sort)?;
        Ok(())
    }

    fn search_after(&mut self, sort: &str, cursor: &str) -> ExploreResult<()> {
        let keys = parse_sort(sort)?;
        let values = parse_cursor(&keys, cursor, &self.context.collection.id_path)?;
        self.after = Some((keys, values));
        Ok(())
    }

    fn aggregate(&mut self, plan: &AggregationPlan) -> ExploreResult<()> {
        let capabilities = self.capabilities();
        for level in &plan.levels {
            if !capabilities.raw_geometries && !level.raw_geometries.is_empty() {
                warn!(level = %level.name, "raw geometries are not supported by the relational backend, ignoring");
            }
            if !capabilities.fetch_hits && level.fetch_hits.is_some() {
                warn!(level = %level.name, "fetch_hits is not supported by the relational backend, ignoring");
            }
        }
        self.request = Request::Aggregation(plan.clone());
        Ok(())
    }

    fn compute(&mut self, field: &str, metric: ComputationMetric) -> ExploreResult<()> {
        check_computation(
            &self.context.collection,
            self.context.resolver.as_ref(),
            field,
            metric,
        )?;
        self.request = Request::Computation {
            field: field.trim().to_string(),
            metric,
        };
        Ok(())
    }

    fn build(self) -> ExploreResult<SqlPlan> {
        let statements = match &self.request {
            Request::Hits => vec![self.count_statement()?, self.hits_statement()?],
            Request::Aggregation(plan) => {
                let mut statements = vec![self.count_statement()?];
                for depth in 0..plan.depth() {
                    let (sql, params) = level_statement(
                        plan,
                        depth,
                        self.table(),
                        &self.context.collection.centroid_path,
                        &self.filters,
                    )?;
                    statements.push(SqlStatement {
                        purpose: level_statement_name(depth),
                        sql,
                        params,
                    });
                }
                statements
            }
            Request::Computation { field, metric } => {
                let mut select = vec![format!("COUNT(*) AS {}", quote(TOTAL_COLUMN))];
                select.extend(computation_columns(field, *metric));
                vec![self.statement(COMPUTATION_STATEMENT, &select, &[], SqlWriter::new(), "")?]
            }
        };

        let plan = SqlPlan {
            table: self.table().to_string(),
            statements,
        };
        debug!(table = %plan.table, statements = plan.statements.len(), "compiled sql plan");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::errors::ExploreErrorCode;
    use crate::model::{
        AggregationSpec, AggregationType, CollectionReference, FieldType, FilterExpression,
        MultiValueFilter, Operator, StaticFieldTypes,
    };

    fn context() -> CompilerContext {
        let collection =
            CollectionReference::new("flights", "flights_tbl", "id", "track", "position", "timestamp");
        let types = StaticFieldTypes::new()
            .with_field("id", FieldType::Keyword)
            .with_field("status", FieldType::Keyword)
            .with_field("speed", FieldType::Double)
            .with_field("timestamp", FieldType::Date)
            .with_field("position", FieldType::GeoPoint)
            .with_field("track", FieldType::GeoShape);
        CompilerContext::new(Arc::new(collection), Arc::new(types))
    }

    #[test]
    fn test_hits_statements() {
        let mut compiler = SqlCompiler::new(context());
        compiler
            .filter(
                &MultiValueFilter::new(vec![FilterExpression::new("status", Operator::Eq, "A")]),
                None,
            )
            .unwrap();
        compiler.filter_size(20, 40);
        compiler.sort("-speed,id").unwrap();
        let plan = compiler.build().unwrap();

        let count = plan.statement(COUNT_STATEMENT).unwrap();
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS \"totalnb\" FROM \"flights_tbl\" WHERE \"status\" = $1"
        );

        let hits = plan.statement(HITS_STATEMENT).unwrap();
        assert!(hits.sql.contains("ST_AsGeoJSON(\"track\") AS \"_geometry\""));
        assert!(hits.sql.contains("\"speed\" AS \"_sort_0\", \"id\" AS \"_sort_1\""));
        assert!(hits
            .sql
            .ends_with("ORDER BY \"speed\" DESC, \"id\" ASC LIMIT 20 OFFSET 40"));
        assert_eq!(hits.params, vec![Scalar::Text("A".to_string())]);
    }

    #[test]
    fn test_default_order_on_id() {
        let plan = SqlCompiler::new(context()).build().unwrap();
        let hits = plan.statement(HITS_STATEMENT).unwrap();
        assert!(hits.sql.ends_with("ORDER BY \"id\" ASC LIMIT 10"));
    }

    #[test]
    fn test_keyset_and_filters_share_params() {
        let mut compiler = SqlCompiler::new(context());
        compiler
            .filter(
                &MultiValueFilter::new(vec![FilterExpression::new("speed", Operator::Gt, "100")]),
                None,
            )
            .unwrap();
        compiler.sort("-speed,id").unwrap();
        compiler.search_after("-speed,id", "250,f1").unwrap();
        let plan = compiler.build().unwrap();
        let hits = plan.statement(HITS_STATEMENT).unwrap();
        assert!(hits.sql.contains(
            "WHERE \"speed\" > $4 AND ((\"speed\" < $1) OR (\"speed\" = $2 AND \"id\" > $3))"
        ));
        assert_eq!(hits.params.len(), 4);
        assert_eq!(hits.params[3], Scalar::Integer(100));

        let count = plan.statement(COUNT_STATEMENT).unwrap();
        assert_eq!(count.params, vec![Scalar::Integer(100)]);
    }

    #[test]
    fn test_geo_distance_sort() {
        let mut compiler = SqlCompiler::new(context());
        compiler.sort("geodistance:43.6 1.44").unwrap();
        let plan = compiler.build().unwrap();
        let hits = plan.statement(HITS_STATEMENT).unwrap();
        assert!(hits.sql.contains("ST_MakePoint(1.44, 43.6)"));
        assert!(hits.sql.contains("AS \"_sort_0\""));
    }

    #[test]
    fn test_unscoped_text_rejected() {
        let mut compiler = SqlCompiler::new(context());
        let err = compiler
            .filter_q(&MultiValueFilter::new(vec!["late".to_string()]))
            .unwrap_err();
        assert_eq!(err.code(), ExploreErrorCode::NotAllowed);
    }

    #[test]
    fn test_aggregation_statements() {
        let ctx = context();
        let plan = AggregationPlan::compile(
            &[
                AggregationSpec::new(AggregationType::Geohash).interval("3"),
                AggregationSpec::new(AggregationType::Term).field("status"),
            ],
            &ctx.collection,
            ctx.resolver.as_ref(),
            true,
        )
        .unwrap();
        let mut compiler = SqlCompiler::new(ctx);
        compiler.aggregate(&plan).unwrap();
        let sql = compiler.build().unwrap();
        let purposes: Vec<&str> = sql.statements.iter().map(|s| s.purpose.as_str()).collect();
        assert_eq!(purposes, vec!["count", "level_0", "level_1"]);
    }

    #[test]
    fn test_computation_statement() {
        let mut compiler = SqlCompiler::new(context());
        compiler.compute("speed", ComputationMetric::Avg).unwrap();
        let plan = compiler.build().unwrap();
        assert_eq!(
            plan.statement(COMPUTATION_STATEMENT).unwrap().sql,
            "SELECT COUNT(*) AS \"totalnb\", AVG(\"speed\") AS \"value\" FROM \"flights_tbl\""
        );
    }
}
