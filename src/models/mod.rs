pub mod delimiters;
pub mod parse_options;
