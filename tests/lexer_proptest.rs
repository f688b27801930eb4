//! Property tests for the lexer over generated templates.

use proptest::prelude::*;
use stache::{Delimiters, Lexer, Token, TokenKind};

fn lex<'a>(input: &'a str, delimiters: &Delimiters) -> Vec<Token<'a>> {
    Lexer::new(input, delimiters).collect()
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("abc".to_string()),
        Just("héllo".to_string()),
        Just("x.y".to_string()),
        Just("!".to_string()),
        "[a-z]{1,6}",
    ]
}

fn whitespace_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(" ".to_string()),
        Just("\t".to_string()),
        Just("\n".to_string()),
        Just("\r\n".to_string()),
        Just("\r".to_string()),
    ]
}

/// Closed tags in `open`/`close`, without delimiter changes or triple braces.
fn tag_strategy(open: &'static str, close: &'static str) -> impl Strategy<Value = String> {
    (
        prop_oneof![
            Just(""),
            Just("#"),
            Just("/"),
            Just("^"),
            Just("!"),
            Just(">"),
            Just("&"),
        ],
        "( ?[a-z]{0,5} ?)",
    )
        .prop_map(move |(marker, body)| format!("{open}{marker}{body}{close}"))
}

fn template_strategy(open: &'static str, close: &'static str) -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            text_strategy(),
            whitespace_strategy(),
            tag_strategy(open, close),
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn test_tokens_cover_input(input in template_strategy("{{", "}}")) {
        let tokens = lex(&input, &Delimiters::default());
        let joined: String = tokens.iter().map(|t| t.value).collect();
        prop_assert_eq!(&joined, &input);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_tokens_cover_input_custom_delimiters(input in template_strategy("<%", "%>")) {
        let tokens = lex(&input, &Delimiters::new("<%", "%>"));
        let joined: String = tokens.iter().map(|t| t.value).collect();
        prop_assert_eq!(&joined, &input);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_positions_follow_values(input in template_strategy("{{", "}}")) {
        let mut offset = 0;
        for token in lex(&input, &Delimiters::default()) {
            prop_assert_eq!(token.pos, offset);
            offset += token.value.len();
        }
    }

    #[test]
    fn test_single_terminal_token(input in "[{}=!#^/&>%<é a-z\t\r\n]{0,60}") {
        let mut lexer = Lexer::new(&input, &Delimiters::default());
        let tokens: Vec<Token> = lexer.by_ref().collect();
        let terminals = tokens.iter().filter(|t| t.kind.is_terminal()).count();
        prop_assert_eq!(terminals, 1);
        prop_assert!(tokens.last().is_some_and(|t| t.kind.is_terminal()));
        prop_assert!(lexer.next().is_none());
    }
}
