//! Parameterised SQL text

use crate::planner::Scalar;

/// Quotes an identifier
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Collects bound parameters while SQL text is written; placeholders are
/// `$1`, `$2`, ...
#[derive(Debug, Default)]
pub struct SqlWriter {
    params: Vec<Scalar>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its placeholder
    pub fn bind(&mut self, value: Scalar) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    pub fn into_params(self) -> Vec<Scalar> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_numbered() {
        let mut writer = SqlWriter::new();
        assert_eq!(writer.bind(Scalar::Integer(1)), "$1");
        assert_eq!(writer.bind(Scalar::Text("a".into())), "$2");
        assert_eq!(writer.into_params().len(), 2);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote("geo.point"), "\"geo.point\"");
    }
}
