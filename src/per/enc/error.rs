use snafu::Snafu;

#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[snafu(display("CHOICE value has no selected alternative"))]
    UnselectedChoice,
    #[snafu(display("CHOICE value holds an unknown extension selection"))]
    UnknownSelection,
    #[snafu(display("open type holds neither a value nor a buffer"))]
    EmptyOpenType,
    #[snafu(display("SEQUENCE field {pos} is marked present but holds no value"))]
    MissingField { pos: usize },
    #[snafu(display("length {len} requires the fragmented form, which is not supported"))]
    UnsupportedLength { len: usize },
    #[snafu(display("value {value} lies outside its encodable range"))]
    ValueOutOfRange { value: i64 },
    #[snafu(display("character {ch:?} is not in the permitted alphabet"))]
    InvalidCharacter { ch: char },
}
