//! Encoding and decoding of array literals in the text format, e.g.
//! `{1,2,NULL,"a b"}`.
//!
//! <https://www.postgresql.org/docs/current/arrays.html#ARRAYS-IO>

use crate::error::Error;
use crate::types::Oid;

/// One element of an array literal, in the string model: the element is
/// either SQL NULL, a textual value, or a nested array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Null,
    Text(String),
    Array(Vec<ArrayElement>),
}

/// An array element after type-aware coercion of the textual tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<ArrayValue>),
}

/// Encode a sequence of elements as an array literal.
pub fn encode_array(elements: &[ArrayElement]) -> String {
    let mut out = String::new();
    encode_into(&mut out, elements);
    out
}

fn encode_into(out: &mut String, elements: &[ArrayElement]) {
    out.push('{');

    for (i, element) in elements.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }

        match element {
            ArrayElement::Null => out.push_str("NULL"),

            ArrayElement::Array(inner) => encode_into(out, inner),

            ArrayElement::Text(value) => {
                if needs_quotes(value) {
                    out.push('"');

                    for ch in value.chars() {
                        // backslashes and quotes are escaped; the backslash
                        // arm must come first or escapes would double up
                        if ch == '\\' || ch == '"' {
                            out.push('\\');
                        }

                        out.push(ch);
                    }

                    out.push('"');
                } else {
                    out.push_str(value);
                }
            }
        }
    }

    out.push('}');
}

// A bare (unquoted) token cannot be empty, contain a delimiter or quoting
// character or whitespace, or spell the NULL keyword.
fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("null")
        || value
            .chars()
            .any(|ch| matches!(ch, ',' | '{' | '}' | '"' | '\\' | ' ' | '\t' | '\n' | '\r'))
}

/// Decode an array literal into the string model.
pub fn decode_array(input: &str) -> Result<Vec<ArrayElement>, Error> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };

    parser.skip_whitespace();

    let elements = parser.array()?;

    parser.skip_whitespace();

    if parser.pos != parser.input.len() {
        return Err(malformed("unexpected characters after closing brace"));
    }

    Ok(elements)
}

/// Decode an array literal and coerce each token according to the element
/// type: `int2`/`int4` parse as signed integers, `int8` stays textual to
/// avoid precision loss, `float4`/`float8`/`numeric` parse as floats, and
/// `bool` reads `t`/`true` (case-insensitive) as true and anything else as
/// false. All other types pass the unescaped text through.
pub fn decode_array_typed(input: &str, element_type: Oid) -> Result<Vec<ArrayValue>, Error> {
    decode_array(input)?
        .into_iter()
        .map(|element| coerce(element, element_type))
        .collect()
}

fn coerce(element: ArrayElement, ty: Oid) -> Result<ArrayValue, Error> {
    Ok(match element {
        ArrayElement::Null => ArrayValue::Null,

        ArrayElement::Array(inner) => ArrayValue::Array(
            inner
                .into_iter()
                .map(|element| coerce(element, ty))
                .collect::<Result<_, _>>()?,
        ),

        ArrayElement::Text(token) => match ty {
            Oid::INT2 | Oid::INT4 => ArrayValue::Int(token.parse().map_err(|_| {
                Error::Decode(
                    format!("invalid input syntax for type integer: {token:?}").into_boxed_str(),
                )
            })?),

            Oid::FLOAT4 | Oid::FLOAT8 | Oid::NUMERIC => {
                ArrayValue::Float(token.parse().map_err(|_| {
                    Error::Decode(
                        format!("invalid input syntax for type numeric: {token:?}")
                            .into_boxed_str(),
                    )
                })?)
            }

            Oid::BOOL => {
                ArrayValue::Bool(token.eq_ignore_ascii_case("t") || token.eq_ignore_ascii_case("true"))
            }

            _ => ArrayValue::Text(token),
        },
    })
}

fn malformed(detail: &str) -> Error {
    Error::Decode(format!("malformed array literal: {detail}").into_boxed_str())
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn array(&mut self) -> Result<Vec<ArrayElement>, Error> {
        if self.peek() != Some(b'{') {
            return Err(malformed("expected opening brace"));
        }

        self.pos += 1;
        self.skip_whitespace();

        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Vec::new());
        }

        let mut elements = Vec::new();

        loop {
            self.skip_whitespace();

            elements.push(self.element()?);

            self.skip_whitespace();

            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }

                Some(b'}') => {
                    self.pos += 1;
                    return Ok(elements);
                }

                _ => return Err(malformed("expected comma or closing brace")),
            }
        }
    }

    fn element(&mut self) -> Result<ArrayElement, Error> {
        match self.peek() {
            Some(b'{') => Ok(ArrayElement::Array(self.array()?)),
            Some(b'"') => Ok(ArrayElement::Text(self.quoted()?)),
            _ => self.bare(),
        }
    }

    fn quoted(&mut self) -> Result<String, Error> {
        // consume the opening quote
        self.pos += 1;

        let mut value = Vec::new();

        loop {
            match self.peek() {
                Some(b'\\') => {
                    self.pos += 1;

                    match self.peek() {
                        Some(escaped) => {
                            value.push(escaped);
                            self.pos += 1;
                        }

                        None => return Err(malformed("unterminated quoted element")),
                    }
                }

                Some(b'"') => {
                    self.pos += 1;

                    return String::from_utf8(value)
                        .map_err(|_| malformed("invalid UTF-8 in quoted element"));
                }

                Some(byte) => {
                    value.push(byte);
                    self.pos += 1;
                }

                None => return Err(malformed("unterminated quoted element")),
            }
        }
    }

    fn bare(&mut self) -> Result<ArrayElement, Error> {
        let start = self.pos;

        while !matches!(self.peek(), Some(b',' | b'}') | None) {
            self.pos += 1;
        }

        let token = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| malformed("invalid UTF-8 in element"))?
            .trim_end_matches([' ', '\t', '\n', '\r']);

        if token.is_empty() {
            return Err(malformed("empty element"));
        }

        if token.eq_ignore_ascii_case("null") {
            Ok(ArrayElement::Null)
        } else {
            Ok(ArrayElement::Text(token.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ArrayElement {
        ArrayElement::Text(s.to_owned())
    }

    #[test]
    fn it_encodes_bare_and_quoted_elements() {
        assert_eq!(encode_array(&[]), "{}");
        assert_eq!(encode_array(&[text("a"), text("b")]), "{a,b}");
        assert_eq!(encode_array(&[text("a b")]), r#"{"a b"}"#);
        assert_eq!(encode_array(&[text("")]), r#"{""}"#);
        assert_eq!(encode_array(&[ArrayElement::Null, text("x")]), "{NULL,x}");

        // the literal string NULL must be quoted to survive
        assert_eq!(encode_array(&[text("null")]), r#"{"null"}"#);
    }

    #[test]
    fn it_escapes_backslash_before_quote() {
        assert_eq!(encode_array(&[text(r#"\""#)]), r#"{"\\\""}"#);
        assert_eq!(encode_array(&[text(r"c:\tmp")]), r#"{"c:\\tmp"}"#);
    }

    #[test]
    fn it_encodes_nested_arrays() {
        let inner = ArrayElement::Array(vec![text("1"), text("2")]);
        let outer = vec![inner, ArrayElement::Array(vec![text("3"), text("4")])];

        assert_eq!(encode_array(&outer), "{{1,2},{3,4}}");
    }

    #[test]
    fn it_decodes_with_whitespace_around_commas() {
        assert_eq!(
            decode_array("{ a , b ,\tc }").unwrap(),
            vec![text("a"), text("b"), text("c")]
        );
    }

    #[test]
    fn it_decodes_quoted_elements() {
        assert_eq!(
            decode_array(r#"{"a b","x\"y","z\\w"}"#).unwrap(),
            vec![text("a b"), text(r#"x"y"#), text(r"z\w")]
        );

        // quoted NULL is the string, bare NULL is the absence
        assert_eq!(
            decode_array(r#"{NULL,"NULL",null}"#).unwrap(),
            vec![ArrayElement::Null, text("NULL"), ArrayElement::Null]
        );
    }

    #[test]
    fn it_rejects_malformed_literals() {
        assert!(decode_array("1,2,3").is_err());
        assert!(decode_array("{1,2").is_err());
        assert!(decode_array(r#"{"unterminated}"#).is_err());
        assert!(decode_array("{}x").is_err());
        assert!(decode_array("{,}").is_err());
        assert!(decode_array("{1,}").is_err());
    }

    #[test]
    fn it_coerces_tokens_by_element_type() {
        assert_eq!(
            decode_array_typed("{1,-2,NULL}", Oid::INT4).unwrap(),
            vec![ArrayValue::Int(1), ArrayValue::Int(-2), ArrayValue::Null]
        );

        // int8 stays textual to preserve the full 64-bit range
        assert_eq!(
            decode_array_typed("{9223372036854775807}", Oid::INT8).unwrap(),
            vec![ArrayValue::Text("9223372036854775807".to_owned())]
        );

        assert_eq!(
            decode_array_typed("{1.5,-0.25}", Oid::FLOAT8).unwrap(),
            vec![ArrayValue::Float(1.5), ArrayValue::Float(-0.25)]
        );

        assert_eq!(
            decode_array_typed("{t,TRUE,f,banana}", Oid::BOOL).unwrap(),
            vec![
                ArrayValue::Bool(true),
                ArrayValue::Bool(true),
                ArrayValue::Bool(false),
                ArrayValue::Bool(false),
            ]
        );

        assert!(decode_array_typed("{one}", Oid::INT4).is_err());
    }

    #[test]
    fn it_round_trips_nested_structures() {
        let original = vec![
            ArrayElement::Array(vec![text("plain"), text("with space"), ArrayElement::Null]),
            ArrayElement::Array(vec![text(r#"qu"ote"#), text(r"back\slash"), text("")]),
        ];

        assert_eq!(decode_array(&encode_array(&original)).unwrap(), original);
    }

    #[test]
    fn it_round_trips_generated_arrays() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // adversarial alphabet: every character class the quoting rules
        // care about
        const TOKENS: &[&str] = &[
            "a", "abc", "", " ", "NULL", "null", ",", "{", "}", "\"", "\\", "a,b", "x\ty",
            "line\nbreak", "\\\"", "ünïcödé",
        ];

        fn generate(rng: &mut StdRng, depth: u32) -> ArrayElement {
            match rng.gen_range(0..10) {
                0 => ArrayElement::Null,
                1..=2 if depth < 3 => {
                    let len = rng.gen_range(0..4);
                    ArrayElement::Array((0..len).map(|_| generate(rng, depth + 1)).collect())
                }
                _ => ArrayElement::Text(TOKENS[rng.gen_range(0..TOKENS.len())].to_owned()),
            }
        }

        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..500 {
            let len = rng.gen_range(0..6);
            let original: Vec<_> = (0..len).map(|_| generate(&mut rng, 0)).collect();
            let encoded = encode_array(&original);

            assert_eq!(
                decode_array(&encoded).unwrap(),
                original,
                "failed to round-trip {encoded:?}"
            );
        }
    }
}
