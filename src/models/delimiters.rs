use serde::Deserialize;

pub const DEFAULT_OPEN: &str = "{{";
pub const DEFAULT_CLOSE: &str = "}}";

/// 标签分隔符，默认 `{{` / `}}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    /// 任一侧为空时使用默认值
    pub fn new(open: &str, close: &str) -> Self {
        let open = if open.is_empty() { DEFAULT_OPEN } else { open };
        let close = if close.is_empty() { DEFAULT_CLOSE } else { close };
        Self {
            open: open.to_string(),
            close: close.to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.open == DEFAULT_OPEN && self.close == DEFAULT_CLOSE
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN, DEFAULT_CLOSE)
    }
}
