//! # Protocol-Buffer Schema Compiler
//!
//! Compiles `.proto` text made of flat messages with scalar fields:
//!
//! ```text
//! syntax = "proto2";
//! package demo;
//!
//! message Test1 {
//!   optional string foo = 1;
//!   required int32 num = 2 [default = 0];
//! }
//! ```
//!
//! `syntax`, `package`, `import` and `option` statements are accepted and
//! ignored. Nested messages, enums, `oneof`, maps and `repeated` fields are
//! rejected with `CodecError::Schema`.

use crate::adapters::proto_codec::{FieldSpec, ProtoMessageCodec, ScalarType};
use crate::domain::codec::NamedCodec;
use crate::domain::errors::CodecError;
use crate::ports::outbound::SchemaCompiler;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Schema compiler producing `ProtoMessageCodec`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoSchemaCompiler;

impl ProtoSchemaCompiler {
    /// Create a new compiler.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compile into concrete codecs rather than shared trait objects.
    pub fn compile_messages(&self, schema: &str) -> Result<Vec<ProtoMessageCodec>, CodecError> {
        let tokens = tokenize(schema)?;
        Parser::new(&tokens).parse_file()
    }
}

impl SchemaCompiler for ProtoSchemaCompiler {
    fn compile(&self, schema: &str) -> Result<Vec<NamedCodec>, CodecError> {
        let messages = self.compile_messages(schema)?;
        debug!(messages = messages.len(), "[hb-01] Compiled protobuf schema");
        Ok(messages
            .into_iter()
            .map(|codec| NamedCodec::new(codec.message().to_string(), Arc::new(codec)))
            .collect())
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    line: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, CodecError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut prev = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '\n' {
                        line += 1;
                    }
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(CodecError::schema(start, "unterminated comment"));
                }
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::from(quote);
                let mut closed = false;
                for c in chars.by_ref() {
                    text.push(c);
                    if c == quote {
                        closed = true;
                        break;
                    }
                    if c == '\n' {
                        break;
                    }
                }
                if !closed {
                    return Err(CodecError::schema(line, "unterminated string"));
                }
                tokens.push(Token { text, line });
            }
            c if c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '+') => {
                let mut text = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_alphanumeric() || matches!(next, '_' | '.' | '-' | '+') {
                        text.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token { text, line });
            }
            c => tokens.push(Token {
                text: c.to_string(),
                line,
            }),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |token| token.line)
    }

    fn next(&mut self) -> Result<&'a Token, CodecError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| CodecError::schema(self.line(), "unexpected end of schema"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, text: &str) -> Result<(), CodecError> {
        let token = self.next()?;
        if token.text == text {
            Ok(())
        } else {
            Err(CodecError::schema(
                token.line,
                format!("expected `{}`, found `{}`", text, token.text),
            ))
        }
    }

    fn identifier(&mut self) -> Result<&'a Token, CodecError> {
        let token = self.next()?;
        let valid = token
            .text
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_');
        if valid {
            Ok(token)
        } else {
            Err(CodecError::schema(
                token.line,
                format!("expected identifier, found `{}`", token.text),
            ))
        }
    }

    /// Skip to (and past) the next `;`.
    fn skip_statement(&mut self) -> Result<(), CodecError> {
        while self.next()?.text != ";" {}
        Ok(())
    }

    fn parse_file(mut self) -> Result<Vec<ProtoMessageCodec>, CodecError> {
        let mut messages = Vec::new();
        let mut seen = HashSet::new();

        while let Some(token) = self.peek() {
            match token.text.as_str() {
                "syntax" | "package" | "import" | "option" => self.skip_statement()?,
                ";" => self.pos += 1,
                "message" => {
                    let line = token.line;
                    let message = self.parse_message()?;
                    if !seen.insert(message.message().to_string()) {
                        return Err(CodecError::schema(
                            line,
                            format!("duplicate message `{}`", message.message()),
                        ));
                    }
                    messages.push(message);
                }
                other => {
                    return Err(CodecError::schema(
                        token.line,
                        format!("unsupported top-level statement `{}`", other),
                    ))
                }
            }
        }

        Ok(messages)
    }

    fn parse_message(&mut self) -> Result<ProtoMessageCodec, CodecError> {
        self.expect("message")?;
        let name = self.identifier()?.text.clone();
        self.expect("{")?;

        let mut fields: Vec<FieldSpec> = Vec::new();
        loop {
            let token = self.peek().ok_or_else(|| {
                CodecError::schema(self.line(), format!("unterminated message `{}`", name))
            })?;
            match token.text.as_str() {
                "}" => {
                    self.pos += 1;
                    break;
                }
                ";" => self.pos += 1,
                "option" | "reserved" | "extensions" => self.skip_statement()?,
                "message" | "enum" | "oneof" | "map" | "group" | "extend" => {
                    return Err(CodecError::schema(
                        token.line,
                        format!("`{}` inside `{}` is not supported", token.text, name),
                    ))
                }
                _ => {
                    let field = self.parse_field(&name)?;
                    if fields.iter().any(|f| f.tag == field.tag || f.name == field.name) {
                        return Err(CodecError::schema(
                            token.line,
                            format!("duplicate field `{}` in `{}`", field.name, name),
                        ));
                    }
                    fields.push(field);
                }
            }
        }

        Ok(ProtoMessageCodec::new(name, fields))
    }

    fn parse_field(&mut self, message: &str) -> Result<FieldSpec, CodecError> {
        let mut token = self.next()?;
        let required = match token.text.as_str() {
            "required" => {
                token = self.next()?;
                true
            }
            "optional" => {
                token = self.next()?;
                false
            }
            "repeated" => {
                return Err(CodecError::schema(
                    token.line,
                    format!("repeated fields in `{}` are not supported", message),
                ))
            }
            _ => false,
        };

        let scalar = ScalarType::parse(&token.text).ok_or_else(|| {
            CodecError::schema(
                token.line,
                format!("unsupported field type `{}` in `{}`", token.text, message),
            )
        })?;
        let name = self.identifier()?.text.clone();
        self.expect("=")?;

        let tag_token = self.next()?;
        let tag = tag_token
            .text
            .parse::<u32>()
            .ok()
            .filter(|tag| (1..=536_870_911).contains(tag))
            .ok_or_else(|| {
                CodecError::schema(
                    tag_token.line,
                    format!("invalid field number `{}`", tag_token.text),
                )
            })?;

        // field options, e.g. `[default = 0]`
        if self.peek().is_some_and(|token| token.text == "[") {
            while self.next()?.text != "]" {}
        }
        self.expect(";")?;

        Ok(FieldSpec {
            name,
            tag,
            scalar,
            required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codec::Codec;
    use serde_json::json;

    const BASIC: &str = r#"
        syntax = "proto2";
        package basic;

        // first message
        message Test1 {
          optional string foo = 1;
          optional int32 num = 2;
        }

        /* second
           message */
        message Test2 {
          required string bar = 1;
          required int32 id = 2 [default = 0];
        }
    "#;

    #[test]
    fn test_compile_basic_schema() {
        let messages = ProtoSchemaCompiler::new().compile_messages(BASIC).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message(), "Test1");
        assert_eq!(messages[1].message(), "Test2");

        let fields = messages[1].fields();
        assert_eq!(fields[0].name, "bar");
        assert_eq!(fields[1].tag, 2);
        assert!(fields[1].required);
        assert_eq!(fields[1].scalar, ScalarType::Int32);
    }

    #[test]
    fn test_compiled_codecs_roundtrip() {
        let codecs = ProtoSchemaCompiler::new().compile(BASIC).unwrap();
        let test2 = &codecs[1];
        assert_eq!(test2.name, "Test2");

        let value = json!({"bar": "world", "id": 23});
        let bytes = test2.codec.encode(&value).unwrap();
        assert_eq!(test2.codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_single_line_and_proto3_fields() {
        let messages = ProtoSchemaCompiler::new()
            .compile_messages("syntax = \"proto3\"; message Ping { uint64 at = 1; bytes body = 2; }")
            .unwrap();
        assert_eq!(messages[0].fields().len(), 2);
        assert!(!messages[0].fields()[0].required);
    }

    #[test]
    fn test_rejects_repeated() {
        let result = ProtoSchemaCompiler::new()
            .compile_messages("message A {\n  repeated string tags = 1;\n}");
        assert!(matches!(result, Err(CodecError::Schema { line: 2, .. })));
    }

    #[test]
    fn test_rejects_nested_types() {
        let result = ProtoSchemaCompiler::new()
            .compile_messages("message A { message B { } }");
        assert!(matches!(result, Err(CodecError::Schema { .. })));

        let result = ProtoSchemaCompiler::new()
            .compile_messages("message A { Other inner = 1; }");
        assert!(matches!(result, Err(CodecError::Schema { .. })));
    }

    #[test]
    fn test_rejects_duplicates() {
        let result = ProtoSchemaCompiler::new()
            .compile_messages("message A { int32 x = 1; int32 y = 1; }");
        assert!(matches!(result, Err(CodecError::Schema { .. })));

        let result = ProtoSchemaCompiler::new()
            .compile_messages("message A { } message A { }");
        assert!(matches!(result, Err(CodecError::Schema { .. })));
    }

    #[test]
    fn test_unterminated_inputs() {
        let compiler = ProtoSchemaCompiler::new();
        assert!(compiler.compile_messages("message A { int32 x = 1;").is_err());
        assert!(compiler.compile_messages("/* never closed").is_err());
        assert!(compiler.compile_messages("syntax = \"proto2").is_err());
    }

    #[test]
    fn test_invalid_field_number() {
        let result = ProtoSchemaCompiler::new().compile_messages("message A { int32 x = 0; }");
        assert!(matches!(result, Err(CodecError::Schema { .. })));
    }
}
