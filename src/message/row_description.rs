use crate::io::{BufMutExt, Encode};
use crate::types::{Oid, TypeFormat};

/// One column of a result-set description.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,

    /// The originating table, or zero when the column is not a simple
    /// table reference (always zero here; the mock has no tables).
    pub table_oid: u32,

    /// The attribute number within the table, or zero.
    pub attr_num: i16,

    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: TypeFormat,
}

impl Field {
    /// A synthesized text-format column of the given type.
    pub fn text(name: impl Into<String>, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            table_oid: 0,
            attr_num: 0,
            type_oid,
            type_size: type_oid.type_size(),
            type_modifier: -1,
            format: TypeFormat::Text,
        }
    }
}

/// Description of a result set (`T`).
#[derive(Debug)]
pub struct RowDescription<'a> {
    pub fields: &'a [Field],
}

impl Encode for RowDescription<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'T');

        buf.put_length_prefixed(|buf| {
            buf.extend_from_slice(&(self.fields.len() as i16).to_be_bytes());

            for field in self.fields {
                buf.put_str_nul(&field.name);
                buf.extend_from_slice(&field.table_oid.to_be_bytes());
                buf.extend_from_slice(&field.attr_num.to_be_bytes());
                buf.extend_from_slice(&field.type_oid.0.to_be_bytes());
                buf.extend_from_slice(&field.type_size.to_be_bytes());
                buf.extend_from_slice(&field.type_modifier.to_be_bytes());
                buf.extend_from_slice(&i16::from(field.format).to_be_bytes());
            }
        });
    }
}

#[test]
fn test_encode_row_description() {
    let fields = [Field::text("?column?", Oid::INT4)];

    let mut buf = Vec::new();
    RowDescription { fields: &fields }.encode(&mut buf);

    const EXPECTED: &[u8] = b"T\x00\x00\x00\x21\x00\x01?column?\0\
        \x00\x00\x00\x00\x00\x00\
        \x00\x00\x00\x17\x00\x04\xff\xff\xff\xff\x00\x00";

    assert_eq!(buf, EXPECTED);
}
