use bytes::Bytes;

/// Object-model data type numbering used as the type tag on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    Multiple = 3,
    String = 4,
    Opaque = 5,
    Integer = 6,
    Float = 7,
    Boolean = 8,
    ObjectLink = 9,
}

impl DataType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        let data_type = match tag {
            3 => Self::Multiple,
            4 => Self::String,
            5 => Self::Opaque,
            6 => Self::Integer,
            7 => Self::Float,
            8 => Self::Boolean,
            9 => Self::ObjectLink,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// A resource value.
///
/// `String` carries raw bytes: the peer is not required to send UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    String(Bytes),
    Opaque(Bytes),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    ObjectLink { object_id: u16, instance_id: u16 },
    Multiple(Vec<Resource>),
}

impl ResourceValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Opaque(_) => DataType::Opaque,
            Self::Integer(_) => DataType::Integer,
            Self::Float(_) => DataType::Float,
            Self::Boolean(_) => DataType::Boolean,
            Self::ObjectLink { .. } => DataType::ObjectLink,
            Self::Multiple(_) => DataType::Multiple,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(Bytes::from(value.into()))
    }

    pub fn opaque(value: impl Into<Bytes>) -> Self {
        Self::Opaque(value.into())
    }
}

/// A resource: its id and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: u16,
    pub value: ResourceValue,
}

impl Resource {
    pub fn new(id: u16, value: ResourceValue) -> Self {
        Self { id, value }
    }
}
