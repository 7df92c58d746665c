//! Immutable per-type metadata tables.
//!
//! A [`Descriptor`] is the identity of a runtime type: every [`Value`]
//! points at exactly one, two values are assignment-compatible iff they
//! point at the same one, and all three codecs drive their traversal off
//! the tables reachable from it. The tables are produced by the schema
//! compiler as `static` data; the built-in universal types are provided
//! here.
//!
//! SET and SET OF reuse the SEQUENCE and SEQUENCE OF kinds with
//! `Tag::SET`; no codec reorders their components.
//!
//! [`Value`]: crate::types::Value

use crate::tag::Tag;
use crate::types::constraints::Constraint;
use crate::types::strings::{self, CharacterSet};

/// Type metadata: the wire tag plus the variant-specific tables.
#[derive(Debug)]
pub struct Descriptor {
    pub tag: Tag,
    pub kind: Kind,
}

#[derive(Debug, Clone, Copy)]
pub enum Kind {
    Null,
    Boolean,
    Integer {
        constraint: Constraint,
        /// Named numbers, sorted by value.
        names: &'static [NamedNumber],
    },
    Enumerated {
        extendable: bool,
        /// Highest enumerator in the extension root.
        max: i64,
        names: &'static [&'static str],
    },
    ObjectId,
    BitString {
        constraint: Constraint,
    },
    OctetString {
        constraint: Constraint,
    },
    CharString {
        constraint: Constraint,
        set: &'static CharacterSet,
    },
    BmpString {
        constraint: Constraint,
        first: u16,
        last: u16,
    },
    Time,
    Sequence(&'static SequenceInfo),
    SequenceOf {
        constraint: Constraint,
        element: &'static Descriptor,
    },
    Choice(&'static ChoiceInfo),
    Open {
        /// When present, the open type always decodes into this type.
        inner: Option<&'static Descriptor>,
    },
}

/// A named INTEGER value (`failure(1)`-style notation).
#[derive(Debug)]
pub struct NamedNumber {
    pub value: i64,
    pub name: &'static str,
}

/// How a SEQUENCE tags its fields on the BER wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMode {
    /// Context tag = field position, implicit (choices wrap explicitly).
    Automatic,
    /// Each field carries the tag listed in its [`Field`], wrapping the
    /// payload's own header.
    Explicit,
    /// Fields use their payload's tag, or the listed tag in place of it.
    Implicit,
}

/// One declared SEQUENCE field.
#[derive(Debug)]
pub struct Field {
    pub desc: &'static Descriptor,
    /// Index into the optional-present bitmap; `None` for mandatory
    /// fields. Root optionals are numbered 0.. in declaration order.
    pub optional: Option<usize>,
    /// Field tag for Explicit/Implicit modes; `Tag::NONE` under
    /// Automatic (the position decides) or for untagged fields.
    pub tag: Tag,
}

#[derive(Debug)]
pub struct SequenceInfo {
    pub extendable: bool,
    /// Extension-root fields first, then the known extensions.
    pub fields: &'static [Field],
    /// Number of extension-root fields.
    pub num_root: usize,
    /// Number of optional fields in the extension root.
    pub num_optional: usize,
    pub tag_mode: TagMode,
    /// Field names, parallel to `fields`.
    pub names: &'static [&'static str],
}

impl SequenceInfo {
    pub fn known_extensions(&self) -> usize {
        self.fields.len() - self.num_root
    }

    /// The presence-bitmap slot a field occupies: its declared optional
    /// id in the root, `num_optional + k` for extension field `k`.
    pub fn optional_id(&self, pos: usize) -> Option<usize> {
        if pos < self.num_root {
            self.fields[pos].optional
        } else {
            Some(self.num_optional + (pos - self.num_root))
        }
    }

    /// The tag expected in front of field `pos`, `Tag::NONE` when any
    /// tag must be accepted.
    pub fn field_tag(&self, pos: usize) -> Tag {
        match self.tag_mode {
            TagMode::Automatic => Tag::context(pos as u32),
            TagMode::Explicit => self.fields[pos].tag,
            TagMode::Implicit => {
                let field = &self.fields[pos];
                if field.tag.is_none() {
                    field.desc.tag
                } else {
                    field.tag
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct ChoiceInfo {
    pub extendable: bool,
    /// Extension-root alternatives first, then the known extensions.
    pub alternatives: &'static [&'static Descriptor],
    /// Number of extension-root alternatives.
    pub num_root: usize,
    /// Per-alternative outer tags; empty under automatic tagging
    /// (context tag = alternative index).
    pub tags: &'static [Tag],
    /// BER dispatch table, sorted by tag word, mapping a wire tag to an
    /// alternative index; empty under automatic tagging. A zero tag at
    /// the first entry marks an untagged embedded CHOICE to recurse
    /// into.
    pub tag_table: &'static [(u32, usize)],
    /// Alternative names, parallel to `alternatives`.
    pub names: &'static [&'static str],
}

impl ChoiceInfo {
    pub fn total(&self) -> usize {
        self.alternatives.len()
    }

    /// The tag the selected alternative is encoded with (`Tag::NONE`
    /// for an untagged alternative).
    pub fn selection_tag(&self, index: usize) -> Tag {
        if self.tags.is_empty() {
            Tag::context(index as u32)
        } else {
            self.tags[index]
        }
    }
}

impl Descriptor {
    /// The size or value constraint carried by constrained variants.
    pub fn constraint(&self) -> Constraint {
        match &self.kind {
            Kind::Integer { constraint, .. }
            | Kind::BitString { constraint }
            | Kind::OctetString { constraint }
            | Kind::CharString { constraint, .. }
            | Kind::BmpString { constraint, .. }
            | Kind::SequenceOf { constraint, .. } => *constraint,
            _ => Constraint::NONE,
        }
    }

    pub fn is_same(&'static self, other: &'static Descriptor) -> bool {
        core::ptr::eq(self, other)
    }
}

pub static NULL: Descriptor = Descriptor {
    tag: Tag::NULL,
    kind: Kind::Null,
};

pub static BOOLEAN: Descriptor = Descriptor {
    tag: Tag::BOOLEAN,
    kind: Kind::Boolean,
};

pub static INTEGER: Descriptor = Descriptor {
    tag: Tag::INTEGER,
    kind: Kind::Integer {
        constraint: Constraint::NONE,
        names: &[],
    },
};

pub static OBJECT_IDENTIFIER: Descriptor = Descriptor {
    tag: Tag::OBJECT_IDENTIFIER,
    kind: Kind::ObjectId,
};

pub static BIT_STRING: Descriptor = Descriptor {
    tag: Tag::BIT_STRING,
    kind: Kind::BitString {
        constraint: Constraint::NONE,
    },
};

pub static OCTET_STRING: Descriptor = Descriptor {
    tag: Tag::OCTET_STRING,
    kind: Kind::OctetString {
        constraint: Constraint::NONE,
    },
};

pub static NUMERIC_STRING: Descriptor = Descriptor {
    tag: Tag::NUMERIC_STRING,
    kind: Kind::CharString {
        constraint: Constraint::NONE,
        set: &strings::NUMERIC,
    },
};

pub static PRINTABLE_STRING: Descriptor = Descriptor {
    tag: Tag::PRINTABLE_STRING,
    kind: Kind::CharString {
        constraint: Constraint::NONE,
        set: &strings::PRINTABLE,
    },
};

pub static VISIBLE_STRING: Descriptor = Descriptor {
    tag: Tag::VISIBLE_STRING,
    kind: Kind::CharString {
        constraint: Constraint::NONE,
        set: &strings::VISIBLE,
    },
};

pub static IA5_STRING: Descriptor = Descriptor {
    tag: Tag::IA5_STRING,
    kind: Kind::CharString {
        constraint: Constraint::NONE,
        set: &strings::IA5,
    },
};

pub static GENERAL_STRING: Descriptor = Descriptor {
    tag: Tag::GENERAL_STRING,
    kind: Kind::CharString {
        constraint: Constraint::NONE,
        set: &strings::GENERAL,
    },
};

pub static BMP_STRING: Descriptor = Descriptor {
    tag: Tag::BMP_STRING,
    kind: Kind::BmpString {
        constraint: Constraint::NONE,
        first: 0,
        last: 0xFFFF,
    },
};

pub static GENERALIZED_TIME: Descriptor = Descriptor {
    tag: Tag::GENERALIZED_TIME,
    kind: Kind::Time,
};

pub static OPEN: Descriptor = Descriptor {
    tag: Tag::NONE,
    kind: Kind::Open { inner: None },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_identity_is_pointer_identity() {
        assert!(INTEGER.is_same(&INTEGER));
        assert!(!INTEGER.is_same(&BOOLEAN));
    }

    static POINT: SequenceInfo = SequenceInfo {
        extendable: false,
        fields: &[
            Field {
                desc: &INTEGER,
                optional: None,
                tag: Tag::NONE,
            },
            Field {
                desc: &INTEGER,
                optional: Some(0),
                tag: Tag::NONE,
            },
        ],
        num_root: 2,
        num_optional: 1,
        tag_mode: TagMode::Automatic,
        names: &["x", "y"],
    };

    #[test]
    fn automatic_field_tags_follow_position() {
        assert_eq!(Tag::context(0), POINT.field_tag(0));
        assert_eq!(Tag::context(1), POINT.field_tag(1));
        assert_eq!(Some(0), POINT.optional_id(1));
        assert_eq!(None, POINT.optional_id(0));
    }
}
