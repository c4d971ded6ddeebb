//! The built-in query executor: recognizes enough SQL for drivers, ORMs,
//! and interactive tools to feel at home, and synthesizes plausible
//! results for everything it recognizes.
//!
//! There is no parser or planner here, only statement recognition. Anything
//! unrecognized is a syntax error; anything referencing a relation is an
//! undefined-table error, because there are no relations.

use crate::array::{self, ArrayElement};
use crate::error::Error;
use crate::executor::{QueryExecutor, ResultEvent, TransactionOp};
use crate::message::{Field, Notice};
use crate::sqlstate::SqlState;
use crate::state::{SessionState, TransactionModes};
use crate::types::Oid;

#[derive(Debug, Default)]
pub struct MockExecutor;

impl QueryExecutor for MockExecutor {
    fn execute(&self, query: &str, session: &SessionState) -> Vec<ResultEvent> {
        let sql = query.trim().trim_end_matches(';').trim();

        if sql.is_empty() {
            return vec![ResultEvent::EmptyQuery];
        }

        let (word, rest) = first_word(sql);

        match word.to_ascii_uppercase().as_str() {
            "BEGIN" | "START" => begin(rest),

            "COMMIT" | "END" => vec![ResultEvent::Transaction(TransactionOp::Commit)],

            "ROLLBACK" | "ABORT" => rollback(rest),

            "SAVEPOINT" => match identifier(rest) {
                Some((name, _)) => vec![ResultEvent::Transaction(TransactionOp::Savepoint(name))],
                None => vec![syntax_error(rest)],
            },

            "RELEASE" => {
                let rest = strip_keyword(rest, "SAVEPOINT").unwrap_or(rest);

                match identifier(rest) {
                    Some((name, _)) => {
                        vec![ResultEvent::Transaction(TransactionOp::Release(name))]
                    }
                    None => vec![syntax_error(rest)],
                }
            }

            "SELECT" => select(rest, session),

            "SHOW" => show(rest, session),

            "SET" => set(rest),

            "LISTEN" => match identifier(rest) {
                Some((channel, _)) => vec![
                    ResultEvent::Listen(channel),
                    ResultEvent::CommandComplete("LISTEN".to_owned()),
                ],
                None => vec![syntax_error(rest)],
            },

            "UNLISTEN" => {
                let channel = if rest.trim() == "*" {
                    None
                } else {
                    match identifier(rest) {
                        Some((channel, _)) => Some(channel),
                        None => return vec![syntax_error(rest)],
                    }
                };

                vec![
                    ResultEvent::Unlisten(channel),
                    ResultEvent::CommandComplete("UNLISTEN".to_owned()),
                ]
            }

            "NOTIFY" => notify(rest),

            // DML against nonexistent tables still "succeeds": drivers use
            // these tags to test their affected-rows plumbing
            "INSERT" => vec![ResultEvent::CommandComplete("INSERT 0 1".to_owned())],
            "UPDATE" => vec![ResultEvent::CommandComplete("UPDATE 1".to_owned())],
            "DELETE" => vec![ResultEvent::CommandComplete("DELETE 1".to_owned())],

            "CREATE" | "DROP" | "ALTER" => {
                let (object, _) = first_word(rest);

                vec![ResultEvent::CommandComplete(format!(
                    "{} {}",
                    word.to_ascii_uppercase(),
                    object.to_ascii_uppercase()
                ))]
            }

            "TRUNCATE" => vec![ResultEvent::CommandComplete("TRUNCATE TABLE".to_owned())],

            "DISCARD" => vec![ResultEvent::CommandComplete("DISCARD ALL".to_owned())],

            "EXPLAIN" => vec![
                ResultEvent::RowDescription(vec![Field::text("QUERY PLAN", Oid::TEXT)]),
                ResultEvent::DataRow(vec![Some(
                    "Result  (cost=0.00..0.01 rows=1 width=4)".to_owned(),
                )]),
                ResultEvent::CommandComplete("EXPLAIN".to_owned()),
            ],

            _ => vec![syntax_error(word)],
        }
    }
}

// -- transaction control ----------------------------------------------------

fn begin(rest: &str) -> Vec<ResultEvent> {
    let mut modes = TransactionModes::default();

    let mut words = rest
        .split([' ', '\t', '\n', ','])
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase());

    while let Some(word) = words.next() {
        match word.as_str() {
            "TRANSACTION" | "WORK" => {}

            "ISOLATION" => {
                if words.next().as_deref() != Some("LEVEL") {
                    return vec![syntax_error(rest)];
                }

                let level = match words.next().as_deref() {
                    Some("SERIALIZABLE") => "serializable",

                    Some("REPEATABLE") => {
                        if words.next().as_deref() != Some("READ") {
                            return vec![syntax_error(rest)];
                        }

                        "repeatable read"
                    }

                    Some("READ") => match words.next().as_deref() {
                        Some("COMMITTED") => "read committed",
                        Some("UNCOMMITTED") => "read uncommitted",
                        _ => return vec![syntax_error(rest)],
                    },

                    _ => return vec![syntax_error(rest)],
                };

                modes.isolation_level = Some(level.to_owned());
            }

            "READ" => match words.next().as_deref() {
                Some("ONLY") => modes.read_only = Some(true),
                Some("WRITE") => modes.read_only = Some(false),
                _ => return vec![syntax_error(rest)],
            },

            "NOT" => {
                if words.next().as_deref() != Some("DEFERRABLE") {
                    return vec![syntax_error(rest)];
                }

                modes.deferrable = Some(false);
            }

            "DEFERRABLE" => modes.deferrable = Some(true),

            _ => return vec![syntax_error(rest)],
        }
    }

    vec![ResultEvent::Transaction(TransactionOp::Begin(modes))]
}

fn rollback(rest: &str) -> Vec<ResultEvent> {
    let rest = strip_keyword(rest, "TRANSACTION")
        .or_else(|| strip_keyword(rest, "WORK"))
        .unwrap_or(rest);

    if let Some(rest) = strip_keyword(rest, "TO") {
        let rest = strip_keyword(rest, "SAVEPOINT").unwrap_or(rest);

        return match identifier(rest) {
            Some((name, _)) => vec![ResultEvent::Transaction(TransactionOp::RollbackTo(name))],
            None => vec![syntax_error(rest)],
        };
    }

    if rest.trim().is_empty() {
        vec![ResultEvent::Transaction(TransactionOp::Rollback)]
    } else {
        vec![syntax_error(rest)]
    }
}

// -- SELECT -----------------------------------------------------------------

fn select(rest: &str, session: &SessionState) -> Vec<ResultEvent> {
    // no storage: any relation reference is an undefined table
    if let Some(relation) = from_clause_relation(rest) {
        return vec![ResultEvent::Error(
            Notice::error(
                SqlState::UNDEFINED_TABLE,
                format!("relation \"{relation}\" does not exist"),
            )
            .position(1),
        )];
    }

    let mut fields = Vec::new();
    let mut values = Vec::new();

    for item in split_top_level(rest, ',') {
        let item = item.trim();

        if item.is_empty() {
            return vec![syntax_error(rest)];
        }

        let (item, alias) = split_alias(item);

        match select_item(item, session) {
            Ok((mut field, value)) => {
                if let Some(alias) = alias {
                    field.name = alias;
                }

                fields.push(field);
                values.push(value);
            }

            Err(notice) => return vec![ResultEvent::Error(notice)],
        }
    }

    vec![
        ResultEvent::RowDescription(fields),
        ResultEvent::DataRow(values),
        ResultEvent::CommandComplete("SELECT 1".to_owned()),
    ]
}

fn select_item(item: &str, session: &SessionState) -> Result<(Field, Option<String>), Notice> {
    // '{…}'::int4[] runs the literal through the array codec and emits the
    // normalized form
    if let Some((literal, element_type, array_type)) = array_cast(item) {
        let elements = array::decode_array(&literal).map_err(invalid_array)?;

        // validation only; the wire value keeps the text model
        validate_array(&elements, element_type).map_err(invalid_array)?;

        return Ok((
            Field::text("array", array_type),
            Some(array::encode_array(&elements)),
        ));
    }

    // ARRAY[…] constructors from scalar literals
    if let Some(inner) = strip_prefix_ignore_case(item, "array[").and_then(|s| s.strip_suffix(']'))
    {
        return array_constructor(inner);
    }

    // string literal, with '' unescaping
    if let Some(inner) = item.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok((
            Field::text("?column?", Oid::TEXT),
            Some(inner.replace("''", "'")),
        ));
    }

    if item.eq_ignore_ascii_case("null") {
        return Ok((Field::text("?column?", Oid::TEXT), None));
    }

    if item.eq_ignore_ascii_case("true") {
        return Ok((Field::text("?column?", Oid::BOOL), Some("t".to_owned())));
    }

    if item.eq_ignore_ascii_case("false") {
        return Ok((Field::text("?column?", Oid::BOOL), Some("f".to_owned())));
    }

    if let Ok(value) = item.parse::<i64>() {
        let oid = if i32::try_from(value).is_ok() {
            Oid::INT4
        } else {
            Oid::INT8
        };

        return Ok((Field::text("?column?", oid), Some(value.to_string())));
    }

    if item.parse::<f64>().is_ok() {
        return Ok((Field::text("?column?", Oid::NUMERIC), Some(item.to_owned())));
    }

    // the handful of zero-argument functions every driver pokes at
    let lower = item.to_ascii_lowercase();

    match lower.as_str() {
        "version()" => {
            let version = session.parameter("server_version").unwrap_or("16.4");

            return Ok((
                Field::text("version", Oid::TEXT),
                Some(format!("PostgreSQL {version} on x86_64-pc-linux-gnu")),
            ));
        }

        "current_user" | "session_user" | "current_role" | "user" => {
            let user = session
                .parameter("session_authorization")
                .unwrap_or("postgres");

            return Ok((Field::text(lower, Oid::NAME), Some(user.to_owned())));
        }

        "current_database()" => {
            let database = session.parameter("database").unwrap_or("postgres");

            return Ok((
                Field::text("current_database", Oid::NAME),
                Some(database.to_owned()),
            ));
        }

        "current_schema()" | "current_schema" => {
            return Ok((
                Field::text("current_schema", Oid::NAME),
                Some("public".to_owned()),
            ));
        }

        "pg_backend_pid()" => {
            return Ok((
                Field::text("pg_backend_pid", Oid::INT4),
                Some(session.backend_pid().to_string()),
            ));
        }

        "now()" | "current_timestamp" | "transaction_timestamp()" | "statement_timestamp()" => {
            let name = lower.trim_end_matches("()").to_owned();

            return Ok((
                Field::text(name, Oid::TIMESTAMPTZ),
                Some(
                    chrono::Utc::now()
                        .format("%Y-%m-%d %H:%M:%S%.6f+00")
                        .to_string(),
                ),
            ));
        }

        _ => {}
    }

    if let Some(name) = item.strip_suffix("()") {
        return Err(Notice::error(
            SqlState::UNDEFINED_FUNCTION,
            format!("function {name}() does not exist"),
        )
        .hint("No function matches the given name and argument types.")
        .position(1));
    }

    Err(Notice::error(
        SqlState::UNDEFINED_COLUMN,
        format!("column \"{item}\" does not exist"),
    )
    .position(1))
}

// `'literal'::name[]`: the literal, the element type, and the array type
fn array_cast(item: &str) -> Option<(String, Oid, Oid)> {
    let (value, cast) = item.rsplit_once("::")?;

    let type_name = cast.trim().strip_suffix("[]")?;

    let (element_type, array_type) = match type_name.trim().to_ascii_lowercase().as_str() {
        "bool" | "boolean" => (Oid::BOOL, Oid::ARRAY_BOOL),
        "int2" | "smallint" => (Oid::INT2, Oid::ARRAY_INT2),
        "int4" | "int" | "integer" => (Oid::INT4, Oid::ARRAY_INT4),
        "int8" | "bigint" => (Oid::INT8, Oid::ARRAY_INT8),
        "float4" | "real" => (Oid::FLOAT4, Oid::ARRAY_FLOAT4),
        "float8" | "double precision" => (Oid::FLOAT8, Oid::ARRAY_FLOAT8),
        "numeric" => (Oid::NUMERIC, Oid::ARRAY_NUMERIC),
        "text" | "varchar" => (Oid::TEXT, Oid::ARRAY_TEXT),

        _ => return None,
    };

    let literal = value
        .trim()
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))?;

    Some((literal.replace("''", "'"), element_type, array_type))
}

// Coercion as validation: every token must read as the element type.
fn validate_array(elements: &[ArrayElement], element_type: Oid) -> Result<(), Error> {
    let literal = array::encode_array(elements);
    array::decode_array_typed(&literal, element_type).map(|_| ())
}

fn array_constructor(inner: &str) -> Result<(Field, Option<String>), Notice> {
    let mut elements = Vec::new();
    let mut all_ints = true;

    for item in split_top_level(inner, ',') {
        let item = item.trim();

        if let Some(text) = item.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            all_ints = false;
            elements.push(ArrayElement::Text(text.replace("''", "'")));
        } else if item.eq_ignore_ascii_case("null") {
            elements.push(ArrayElement::Null);
        } else if item.parse::<i64>().is_ok() {
            elements.push(ArrayElement::Text(item.to_owned()));
        } else {
            return Err(Notice::error(
                SqlState::INVALID_PARAMETER_VALUE,
                format!("unsupported ARRAY element: {item}"),
            ));
        }
    }

    let array_type = if all_ints && !elements.is_empty() {
        Oid::ARRAY_INT4
    } else {
        Oid::ARRAY_TEXT
    };

    Ok((
        Field::text("array", array_type),
        Some(array::encode_array(&elements)),
    ))
}

fn invalid_array(err: Error) -> Notice {
    Notice::error(SqlState::INVALID_PARAMETER_VALUE, err.to_string())
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

// `expr AS alias`; the alias must be an identifier
fn split_alias(item: &str) -> (&str, Option<String>) {
    let words = split_top_level(item, ' ');

    if words.len() >= 3 && words[words.len() - 2].eq_ignore_ascii_case("as") {
        if let Some((alias, rest)) = identifier(words[words.len() - 1]) {
            if rest.is_empty() {
                // the words are subslices of `item`; recover the offset of AS
                let as_offset =
                    words[words.len() - 2].as_ptr() as usize - item.as_ptr() as usize;

                return (item[..as_offset].trim_end(), Some(alias));
            }
        }
    }

    (item, None)
}

fn from_clause_relation(rest: &str) -> Option<String> {
    let mut words = split_top_level(rest, ' ').into_iter();

    while let Some(word) = words.next() {
        if word.eq_ignore_ascii_case("from") {
            let relation = words.next()?;
            let (relation, _) = identifier(relation).unwrap_or((relation.to_owned(), ""));

            return Some(relation);
        }
    }

    None
}

// -- SHOW / SET -------------------------------------------------------------

fn show(rest: &str, session: &SessionState) -> Vec<ResultEvent> {
    let rest = rest.trim();

    if rest.eq_ignore_ascii_case("all") {
        let mut parameters: Vec<_> = session.parameters().collect();
        parameters.sort_unstable();

        let mut events = vec![ResultEvent::RowDescription(vec![
            Field::text("name", Oid::TEXT),
            Field::text("setting", Oid::TEXT),
            Field::text("description", Oid::TEXT),
        ])];

        let count = parameters.len();

        for (name, value) in parameters {
            events.push(ResultEvent::DataRow(vec![
                Some(name.to_owned()),
                Some(value.to_owned()),
                None,
            ]));
        }

        events.push(ResultEvent::CommandComplete(format!("SHOW {count}")));

        return events;
    }

    let name = if rest.eq_ignore_ascii_case("transaction isolation level") {
        "transaction_isolation".to_owned()
    } else if rest.eq_ignore_ascii_case("time zone") {
        "TimeZone".to_owned()
    } else {
        match identifier(rest) {
            Some((name, tail)) if tail.trim().is_empty() => name,
            _ => return vec![syntax_error(rest)],
        }
    };

    let value = match session.parameter(&name) {
        Some(value) => value.to_owned(),

        None if name == "transaction_isolation" => session
            .transaction_modes
            .as_ref()
            .and_then(|modes| modes.isolation_level.clone())
            .unwrap_or_else(|| "read committed".to_owned()),

        None => {
            return vec![ResultEvent::Error(Notice::error(
                SqlState::UNDEFINED_OBJECT,
                format!("unrecognized configuration parameter \"{name}\""),
            ))];
        }
    };

    vec![
        ResultEvent::RowDescription(vec![Field::text(name, Oid::TEXT)]),
        ResultEvent::DataRow(vec![Some(value)]),
        ResultEvent::CommandComplete("SHOW".to_owned()),
    ]
}

fn set(rest: &str) -> Vec<ResultEvent> {
    let rest = strip_keyword(rest, "SESSION")
        .or_else(|| strip_keyword(rest, "LOCAL"))
        .unwrap_or(rest);

    // SET TIME ZONE <value> addresses the TimeZone parameter
    if let Some(value) = strip_keyword(rest, "TIME").and_then(|r| strip_keyword(r, "ZONE")) {
        return vec![
            ResultEvent::SetParameter {
                name: "TimeZone".to_owned(),
                value: unquote(value.trim()),
            },
            ResultEvent::CommandComplete("SET".to_owned()),
        ];
    }

    let Some((name, rest)) = identifier(rest) else {
        return vec![syntax_error(rest)];
    };

    let rest = rest.trim();

    let value = if let Some(value) = rest.strip_prefix('=') {
        value
    } else if let Some(value) = strip_keyword(rest, "TO") {
        value
    } else {
        return vec![syntax_error(rest)];
    };

    vec![
        ResultEvent::SetParameter {
            name,
            value: unquote(value.trim()),
        },
        ResultEvent::CommandComplete("SET".to_owned()),
    ]
}

fn notify(rest: &str) -> Vec<ResultEvent> {
    let Some((channel, rest)) = identifier(rest) else {
        return vec![syntax_error(rest)];
    };

    let rest = rest.trim();

    let payload = if let Some(rest) = rest.strip_prefix(',') {
        let rest = rest.trim();

        match rest
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
        {
            Some(inner) => inner.replace("''", "'"),
            None => return vec![syntax_error(rest)],
        }
    } else if rest.is_empty() {
        String::new()
    } else {
        return vec![syntax_error(rest)];
    };

    vec![
        ResultEvent::Notify { channel, payload },
        ResultEvent::CommandComplete("NOTIFY".to_owned()),
    ]
}

// -- lexing helpers ---------------------------------------------------------

fn first_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();

    match s.find(|c: char| c.is_whitespace()) {
        Some(at) => (&s[..at], &s[at..]),
        None => (s, ""),
    }
}

// Strip one leading keyword, case-insensitively; returns the remainder.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let s = s.trim_start();
    let (word, rest) = first_word(s);

    word.eq_ignore_ascii_case(keyword).then_some(rest)
}

// Parse an identifier: double-quoted (case preserved, "" unescaped) or
// plain (folded to lowercase).
fn identifier(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();

    if let Some(rest) = s.strip_prefix('"') {
        let mut name = String::new();
        let mut chars = rest.char_indices();

        while let Some((i, ch)) = chars.next() {
            if ch == '"' {
                // doubled quote is an escaped quote
                if rest[i + 1..].starts_with('"') {
                    name.push('"');
                    chars.next();
                } else {
                    return Some((name, &rest[i + 1..]));
                }
            } else {
                name.push(ch);
            }
        }

        return None;
    }

    let end = s
        .find(|c: char| !c.is_alphanumeric() && c != '_' && c != '$')
        .unwrap_or(s.len());

    if end == 0 {
        return None;
    }

    let (name, rest) = s.split_at(end);

    if !name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') {
        return None;
    }

    Some((name.to_lowercase(), rest))
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|inner| inner.replace("''", "'"))
        .unwrap_or_else(|| value.to_owned())
}

/// Split on `delimiter` outside of quotes, parentheses, and brackets.
fn split_top_level(s: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' | '[' if !in_single && !in_double => depth += 1,
            ')' | ']' if !in_single && !in_double => depth -= 1,

            c if c == delimiter && !in_single && !in_double && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + ch.len_utf8();
            }

            _ => {}
        }
    }

    parts.push(&s[start..]);

    if delimiter == ' ' {
        parts.retain(|part| !part.trim().is_empty());
    }

    parts
}

fn syntax_error(near: &str) -> ResultEvent {
    let (token, _) = first_word(near.trim());
    let token = if token.is_empty() { near.trim() } else { token };

    ResultEvent::Error(
        Notice::error(
            SqlState::SYNTAX_ERROR,
            format!("syntax error at or near \"{token}\""),
        )
        .position(1),
    )
}
