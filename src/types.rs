//! Object identifiers for the built-in data types the mock surface speaks.

/// A PostgreSQL object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oid(pub u32);

#[allow(dead_code)]
impl Oid {
    pub const UNSPECIFIED: Oid = Oid(0);

    // Scalar

    pub const BOOL: Oid = Oid(16);
    pub const BYTEA: Oid = Oid(17);
    pub const NAME: Oid = Oid(19);

    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);

    pub const TEXT: Oid = Oid(25);

    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);

    pub const VARCHAR: Oid = Oid(1043);

    pub const DATE: Oid = Oid(1082);
    pub const TIME: Oid = Oid(1083);
    pub const TIMESTAMP: Oid = Oid(1114);
    pub const TIMESTAMPTZ: Oid = Oid(1184);

    pub const NUMERIC: Oid = Oid(1700);

    // Arrays

    pub const ARRAY_BOOL: Oid = Oid(1000);
    pub const ARRAY_INT2: Oid = Oid(1005);
    pub const ARRAY_INT4: Oid = Oid(1007);
    pub const ARRAY_TEXT: Oid = Oid(1009);
    pub const ARRAY_INT8: Oid = Oid(1016);
    pub const ARRAY_FLOAT4: Oid = Oid(1021);
    pub const ARRAY_FLOAT8: Oid = Oid(1022);
    pub const ARRAY_NUMERIC: Oid = Oid(1231);

    /// For an array type, the element type; `None` for non-array types.
    pub fn element(self) -> Option<Oid> {
        Some(match self {
            Oid::ARRAY_BOOL => Oid::BOOL,
            Oid::ARRAY_INT2 => Oid::INT2,
            Oid::ARRAY_INT4 => Oid::INT4,
            Oid::ARRAY_TEXT => Oid::TEXT,
            Oid::ARRAY_INT8 => Oid::INT8,
            Oid::ARRAY_FLOAT4 => Oid::FLOAT4,
            Oid::ARRAY_FLOAT8 => Oid::FLOAT8,
            Oid::ARRAY_NUMERIC => Oid::NUMERIC,

            _ => return None,
        })
    }

    /// The `typlen` reported in `RowDescription` for this type; `-1` for
    /// variable-width types.
    pub fn type_size(self) -> i16 {
        match self {
            Oid::BOOL => 1,
            Oid::INT2 => 2,
            Oid::INT4 | Oid::FLOAT4 | Oid::DATE => 4,
            Oid::INT8 | Oid::FLOAT8 | Oid::TIME | Oid::TIMESTAMP | Oid::TIMESTAMPTZ => 8,
            Oid::NAME => 64,

            _ => -1,
        }
    }
}

/// The format of a value on the wire. This server emits text only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum TypeFormat {
    Text = 0,
    Binary = 1,
}

impl From<TypeFormat> for i16 {
    fn from(format: TypeFormat) -> Self {
        format as i16
    }
}
