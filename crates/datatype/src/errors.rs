use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown datatype name '{0}'")]
    UnknownName(String),

    #[error("datatype {kind} requires a bit-width greater than zero")]
    ZeroWidth { kind: &'static str },

    #[error("fixed-point integer width {int_width} exceeds total width {width}")]
    FixedPointWidth { width: u32, int_width: u32 },
}
