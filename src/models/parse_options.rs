use serde::Deserialize;

use crate::models::delimiters::Delimiters;

/// 解析选项
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    pub delimiters: Delimiters,
    /// 解析开始前就在作用域内的变量名，例如执行时数据的顶层字段
    pub variables: Vec<String>,
    /// Helper names carried through for the execution engine. The parser
    /// does not consult them.
    pub helpers: Vec<String>,
    /// 词法分析在独立线程运行，经两格通道把 token 交给解析器
    pub threaded: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiters: Delimiters::default(),
            variables: Vec::new(),
            helpers: Vec::new(),
            threaded: true,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiters(mut self, open: &str, close: &str) -> Self {
        self.delimiters = Delimiters::new(open, close);
        self
    }

    pub fn variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn helpers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.helpers.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let opts = ParseOptions::new()
            .delimiters("<%", "%>")
            .variables(["list", "item"])
            .threaded(false);
        assert_eq!(opts.delimiters, Delimiters::new("<%", "%>"));
        assert_eq!(opts.variables, vec!["list".to_string(), "item".to_string()]);
        assert!(opts.helpers.is_empty());
        assert!(!opts.threaded);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let opts: ParseOptions =
            serde_json::from_str(r#"{"variables": ["user"], "delimiters": {"open": "[["}}"#)
                .unwrap();
        assert_eq!(opts.variables, vec!["user".to_string()]);
        assert_eq!(opts.delimiters.open, "[[");
        assert_eq!(opts.delimiters.close, "}}");
        assert!(opts.threaded);
    }
}
