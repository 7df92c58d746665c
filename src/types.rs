//! The ASN.1 data model: descriptors, constraints and runtime values.

pub mod constraints;
pub mod descriptor;
pub mod oid;
pub mod strings;
pub mod time;
pub mod value;

pub use constraints::{Constraint, ConstraintKind};
pub use descriptor::{
    ChoiceInfo, Descriptor, Field, Kind, NamedNumber, SequenceInfo, TagMode,
};
pub use time::GeneralizedTime;
pub use value::{BitString, ChoiceValue, OpenValue, Repr, SequenceValue, Value};
