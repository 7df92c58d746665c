//! The media-gateway-control scenario: a hand-written descriptor table
//! for the subset of H.248 exercised by the classic MegacoMessage
//! fixture, round-tripped through all three rule sets.

use asn1rt::prelude::*;
use asn1rt::types::strings;

// Wire bytes of the "set termination capabilities" request.
const FIXTURE: &[u8] = &[
    0x30, 0x55, 0xA1, 0x53, 0x80, 0x01, 0x01, 0xA1, //
    0x0C, 0xA0, 0x0A, 0x80, 0x04, 0xA4, 0x30, 0x33, //
    0xEE, 0x81, 0x02, 0x13, 0x9C, 0xA2, 0x40, 0xA1, //
    0x3E, 0xA0, 0x3C, 0x80, 0x01, 0x01, //
    0xA1, 0x37, 0x30, 0x35, 0x80, 0x04, 0x19, 0x99, //
    0x26, 0x9E, 0xA3, 0x2D, 0x30, 0x2B, 0xA0, 0x29, //
    0xA0, 0x27, 0xA0, 0x0A, 0x30, 0x08, 0xA0, 0x03, //
    0x04, 0x01, 0x00, 0x81, 0x01, 0x00, 0xA1, 0x19, //
    0xA0, 0x17, 0xA1, 0x15, 0xA0, 0x13, //
    0xA1, 0x11, 0xA0, 0x0F, 0x30, 0x0D, 0x30, 0x0B, //
    0x80, 0x04, 0x00, 0x00, 0x10, 0x01, 0xA1, 0x03, //
    0x04, 0x01, 0x01,
];

const fn seq(info: &'static SequenceInfo) -> Descriptor {
    Descriptor {
        tag: Tag::SEQUENCE,
        kind: Kind::Sequence(info),
    }
}

const fn choice(info: &'static ChoiceInfo) -> Descriptor {
    Descriptor {
        tag: Tag::NONE,
        kind: Kind::Choice(info),
    }
}

const fn seq_of(element: &'static Descriptor) -> Descriptor {
    Descriptor {
        tag: Tag::SEQUENCE,
        kind: Kind::SequenceOf {
            constraint: Constraint::NONE,
            element,
        },
    }
}

const fn mandatory(desc: &'static Descriptor) -> Field {
    Field {
        desc,
        optional: None,
        tag: Tag::NONE,
    }
}

const fn optional(desc: &'static Descriptor, id: usize) -> Field {
    Field {
        desc,
        optional: Some(id),
        tag: Tag::NONE,
    }
}

static VERSION: Descriptor = Descriptor {
    tag: Tag::INTEGER,
    kind: Kind::Integer {
        constraint: Constraint::fixed(0, 99),
        names: &[],
    },
};

static UINT16: Descriptor = Descriptor {
    tag: Tag::INTEGER,
    kind: Kind::Integer {
        constraint: Constraint::fixed(0, 65535),
        names: &[],
    },
};

static UINT32: Descriptor = Descriptor {
    tag: Tag::INTEGER,
    kind: Kind::Integer {
        constraint: Constraint::fixed(0, 4294967295),
        names: &[],
    },
};

static PRIORITY: Descriptor = Descriptor {
    tag: Tag::INTEGER,
    kind: Kind::Integer {
        constraint: Constraint::fixed(0, 15),
        names: &[],
    },
};

static OCTETS_4: Descriptor = Descriptor {
    tag: Tag::OCTET_STRING,
    kind: Kind::OctetString {
        constraint: Constraint::fixed(4, 4),
    },
};

static OCTETS_1: Descriptor = Descriptor {
    tag: Tag::OCTET_STRING,
    kind: Kind::OctetString {
        constraint: Constraint::fixed(1, 1),
    },
};

static OCTETS_1_8: Descriptor = Descriptor {
    tag: Tag::OCTET_STRING,
    kind: Kind::OctetString {
        constraint: Constraint::fixed(1, 8),
    },
};

static PATH_NAME: Descriptor = Descriptor {
    tag: Tag::IA5_STRING,
    kind: Kind::CharString {
        constraint: Constraint::fixed(1, 64),
        set: &strings::IA5,
    },
};

static RELATION: Descriptor = Descriptor {
    tag: Tag::ENUMERATED,
    kind: Kind::Enumerated {
        extendable: true,
        max: 2,
        names: &["greaterThan", "smallerThan", "unequalTo"],
    },
};

static STREAM_MODE: Descriptor = Descriptor {
    tag: Tag::ENUMERATED,
    kind: Kind::Enumerated {
        extendable: true,
        max: 4,
        names: &["sendOnly", "recvOnly", "sendRecv", "inactive", "loopBack"],
    },
};

static EXTRA_INFO_INFO: ChoiceInfo = ChoiceInfo {
    extendable: false,
    alternatives: &[&RELATION, &asn1rt::types::descriptor::BOOLEAN, &asn1rt::types::descriptor::BOOLEAN],
    num_root: 3,
    tags: &[],
    tag_table: &[],
    names: &["relation", "range", "sublist"],
};
static EXTRA_INFO: Descriptor = choice(&EXTRA_INFO_INFO);

static VALUE_LIST: Descriptor = seq_of(&asn1rt::types::descriptor::OCTET_STRING);

static PROPERTY_PARM_INFO: SequenceInfo = SequenceInfo {
    extendable: true,
    fields: &[
        mandatory(&OCTETS_4),
        mandatory(&VALUE_LIST),
        optional(&EXTRA_INFO, 0),
    ],
    num_root: 3,
    num_optional: 1,
    tag_mode: TagMode::Automatic,
    names: &["name", "value", "extraInfo"],
};
static PROPERTY_PARM: Descriptor = seq(&PROPERTY_PARM_INFO);

static PROPERTY_GROUP: Descriptor = seq_of(&PROPERTY_PARM);
static PROP_GRPS: Descriptor = seq_of(&PROPERTY_GROUP);

static LOCAL_REMOTE_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&PROP_GRPS)],
    num_root: 1,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["propGrps"],
};
static LOCAL_REMOTE: Descriptor = seq(&LOCAL_REMOTE_INFO);

static LOCAL_CONTROL_INFO: SequenceInfo = SequenceInfo {
    extendable: true,
    fields: &[
        optional(&STREAM_MODE, 0),
        optional(&asn1rt::types::descriptor::BOOLEAN, 1),
        optional(&asn1rt::types::descriptor::BOOLEAN, 2),
    ],
    num_root: 3,
    num_optional: 3,
    tag_mode: TagMode::Automatic,
    names: &["streamMode", "reserveValue", "reserveGroup"],
};
static LOCAL_CONTROL: Descriptor = seq(&LOCAL_CONTROL_INFO);

static STREAM_PARMS_INFO: SequenceInfo = SequenceInfo {
    extendable: true,
    fields: &[
        optional(&LOCAL_CONTROL, 0),
        optional(&LOCAL_REMOTE, 1),
        optional(&LOCAL_REMOTE, 2),
    ],
    num_root: 3,
    num_optional: 3,
    tag_mode: TagMode::Automatic,
    names: &[
        "localControlDescriptor",
        "localDescriptor",
        "remoteDescriptor",
    ],
};
static STREAM_PARMS: Descriptor = seq(&STREAM_PARMS_INFO);

static STREAM_DESCRIPTOR_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&UINT16), mandatory(&STREAM_PARMS)],
    num_root: 2,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["streamID", "streamParms"],
};
static STREAM_DESCRIPTOR: Descriptor = seq(&STREAM_DESCRIPTOR_INFO);
static STREAM_DESCRIPTORS: Descriptor = seq_of(&STREAM_DESCRIPTOR);

static STREAMS_INFO: ChoiceInfo = ChoiceInfo {
    extendable: false,
    alternatives: &[&STREAM_PARMS, &STREAM_DESCRIPTORS],
    num_root: 2,
    tags: &[],
    tag_table: &[],
    names: &["oneStream", "multiStream"],
};
static STREAMS: Descriptor = choice(&STREAMS_INFO);

static TERMINATION_STATE_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&PROPERTY_GROUP)],
    num_root: 1,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["propertyParms"],
};
static TERMINATION_STATE: Descriptor = seq(&TERMINATION_STATE_INFO);

static MEDIA_DESCRIPTOR_INFO: SequenceInfo = SequenceInfo {
    extendable: true,
    fields: &[optional(&TERMINATION_STATE, 0), optional(&STREAMS, 1)],
    num_root: 2,
    num_optional: 2,
    tag_mode: TagMode::Automatic,
    names: &["termStateDescr", "streams"],
};
static MEDIA_DESCRIPTOR: Descriptor = seq(&MEDIA_DESCRIPTOR_INFO);

static AMM_DESCRIPTOR_INFO: ChoiceInfo = ChoiceInfo {
    extendable: false,
    alternatives: &[&MEDIA_DESCRIPTOR, &asn1rt::types::descriptor::IA5_STRING],
    num_root: 2,
    tags: &[],
    tag_table: &[],
    names: &["mediaDescriptor", "digitMapDescriptor"],
};
static AMM_DESCRIPTOR: Descriptor = choice(&AMM_DESCRIPTOR_INFO);
static AMM_DESCRIPTORS: Descriptor = seq_of(&AMM_DESCRIPTOR);

static WILDCARD: Descriptor = seq_of(&OCTETS_1);

static TERMINATION_ID_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&WILDCARD), mandatory(&OCTETS_1_8)],
    num_root: 2,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["wildcard", "id"],
};
static TERMINATION_ID: Descriptor = seq(&TERMINATION_ID_INFO);
static TERMINATION_IDS: Descriptor = seq_of(&TERMINATION_ID);

static AMM_REQUEST_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&TERMINATION_IDS), mandatory(&AMM_DESCRIPTORS)],
    num_root: 2,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["terminationID", "descriptors"],
};
static AMM_REQUEST: Descriptor = seq(&AMM_REQUEST_INFO);

static COMMAND_INFO: ChoiceInfo = ChoiceInfo {
    extendable: true,
    alternatives: &[&AMM_REQUEST, &AMM_REQUEST, &AMM_REQUEST],
    num_root: 3,
    tags: &[],
    tag_table: &[],
    names: &["addReq", "moveReq", "modReq"],
};
static COMMAND: Descriptor = choice(&COMMAND_INFO);

static COMMAND_REQUEST_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&COMMAND),
        optional(&asn1rt::types::descriptor::NULL, 0),
        optional(&asn1rt::types::descriptor::NULL, 1),
    ],
    num_root: 3,
    num_optional: 2,
    tag_mode: TagMode::Automatic,
    names: &["command", "optional", "wildcardReturn"],
};
static COMMAND_REQUEST: Descriptor = seq(&COMMAND_REQUEST_INFO);
static COMMAND_REQUESTS: Descriptor = seq_of(&COMMAND_REQUEST);

static CONTEXT_REQUEST_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        optional(&PRIORITY, 0),
        optional(&asn1rt::types::descriptor::BOOLEAN, 1),
    ],
    num_root: 2,
    num_optional: 2,
    tag_mode: TagMode::Automatic,
    names: &["priority", "emergency"],
};
static CONTEXT_REQUEST: Descriptor = seq(&CONTEXT_REQUEST_INFO);

static CONTEXT_ATTR_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        optional(&asn1rt::types::descriptor::NULL, 0),
        optional(&asn1rt::types::descriptor::NULL, 1),
    ],
    num_root: 2,
    num_optional: 2,
    tag_mode: TagMode::Automatic,
    names: &["topology", "emergency"],
};
static CONTEXT_ATTR: Descriptor = seq(&CONTEXT_ATTR_INFO);

static ACTION_REQUEST_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&UINT32),
        optional(&CONTEXT_REQUEST, 0),
        optional(&CONTEXT_ATTR, 1),
        mandatory(&COMMAND_REQUESTS),
    ],
    num_root: 4,
    num_optional: 2,
    tag_mode: TagMode::Automatic,
    names: &[
        "contextId",
        "contextRequest",
        "contextAttrAuditReq",
        "commandRequests",
    ],
};
static ACTION_REQUEST: Descriptor = seq(&ACTION_REQUEST_INFO);
static ACTIONS: Descriptor = seq_of(&ACTION_REQUEST);

static TRANSACTION_REQUEST_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&UINT32), mandatory(&ACTIONS)],
    num_root: 2,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["transactionId", "actions"],
};
static TRANSACTION_REQUEST: Descriptor = seq(&TRANSACTION_REQUEST_INFO);

static TRANSACTION_PENDING_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&UINT32)],
    num_root: 1,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["transactionId"],
};
static TRANSACTION_PENDING: Descriptor = seq(&TRANSACTION_PENDING_INFO);

static TRANSACTION_INFO: ChoiceInfo = ChoiceInfo {
    extendable: false,
    alternatives: &[&TRANSACTION_REQUEST, &TRANSACTION_PENDING],
    num_root: 2,
    tags: &[],
    tag_table: &[],
    names: &["transactionRequest", "transactionPending"],
};
static TRANSACTION: Descriptor = choice(&TRANSACTION_INFO);
static TRANSACTIONS: Descriptor = seq_of(&TRANSACTION);

static ERROR_DESCRIPTOR_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&UINT16),
        optional(&asn1rt::types::descriptor::IA5_STRING, 0),
    ],
    num_root: 2,
    num_optional: 1,
    tag_mode: TagMode::Automatic,
    names: &["errorCode", "errorText"],
};
static ERROR_DESCRIPTOR: Descriptor = seq(&ERROR_DESCRIPTOR_INFO);

static MESSAGE_BODY_INFO: ChoiceInfo = ChoiceInfo {
    extendable: false,
    alternatives: &[&ERROR_DESCRIPTOR, &TRANSACTIONS],
    num_root: 2,
    tags: &[],
    tag_table: &[],
    names: &["messageError", "transactions"],
};
static MESSAGE_BODY: Descriptor = choice(&MESSAGE_BODY_INFO);

static IP4_ADDRESS_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[mandatory(&OCTETS_4), optional(&UINT16, 0)],
    num_root: 2,
    num_optional: 1,
    tag_mode: TagMode::Automatic,
    names: &["address", "portNumber"],
};
static IP4_ADDRESS: Descriptor = seq(&IP4_ADDRESS_INFO);

static DOMAIN_NAME_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&asn1rt::types::descriptor::IA5_STRING),
        optional(&UINT16, 0),
    ],
    num_root: 2,
    num_optional: 1,
    tag_mode: TagMode::Automatic,
    names: &["name", "portNumber"],
};
static DOMAIN_NAME: Descriptor = seq(&DOMAIN_NAME_INFO);

static MID_INFO: ChoiceInfo = ChoiceInfo {
    extendable: true,
    alternatives: &[&IP4_ADDRESS, &DOMAIN_NAME, &PATH_NAME],
    num_root: 3,
    tags: &[],
    tag_table: &[],
    names: &["ip4Address", "domainName", "deviceName"],
};
static MID: Descriptor = choice(&MID_INFO);

static MESSAGE_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&VERSION),
        mandatory(&MID),
        mandatory(&MESSAGE_BODY),
    ],
    num_root: 3,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["version", "mId", "messageBody"],
};
static MESSAGE: Descriptor = seq(&MESSAGE_INFO);

static AUTH_HEADER_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[
        mandatory(&OCTETS_4),
        mandatory(&OCTETS_4),
        mandatory(&asn1rt::types::descriptor::OCTET_STRING),
    ],
    num_root: 3,
    num_optional: 0,
    tag_mode: TagMode::Automatic,
    names: &["secParmIndex", "seqNum", "ad"],
};
static AUTH_HEADER: Descriptor = seq(&AUTH_HEADER_INFO);

static MEGACO_MESSAGE_INFO: SequenceInfo = SequenceInfo {
    extendable: false,
    fields: &[optional(&AUTH_HEADER, 0), mandatory(&MESSAGE)],
    num_root: 2,
    num_optional: 1,
    tag_mode: TagMode::Automatic,
    names: &["authHeader", "mess"],
};
static MEGACO_MESSAGE: Descriptor = seq(&MEGACO_MESSAGE_INFO);

/// Build the request the fixture encodes: an Add command carrying one
/// local property group for termination "0".
fn build_request() -> Value {
    let mut msg = MEGACO_MESSAGE.new_value();
    let mess = msg.field_mut(1).unwrap();
    mess.field_mut(0).unwrap().set_integer(1);

    let ip4 = mess.field_mut(1).unwrap().select(0);
    *ip4.field_mut(0).unwrap().octets_mut() = vec![0xA4, 0x30, 0x33, 0xEE];
    ip4.include_optional(0, 1).set_integer(5020);

    let transactions = mess.field_mut(2).unwrap().select(1);
    let request = transactions.push_element().select(0);
    request.field_mut(0).unwrap().set_integer(1);

    let action = request.field_mut(1).unwrap().push_element();
    action.field_mut(0).unwrap().set_integer(429467294);

    let command = action.field_mut(3).unwrap().push_element();
    let add = command.field_mut(0).unwrap().select(0);

    let termination = add.field_mut(0).unwrap().push_element();
    *termination
        .field_mut(0)
        .unwrap()
        .push_element()
        .octets_mut() = vec![0x00];
    *termination.field_mut(1).unwrap().octets_mut() = vec![0x00];

    let media = add.field_mut(1).unwrap().push_element().select(0);
    let stream = media.include_optional(1, 1).select(0);
    let local = stream.include_optional(1, 1);
    let group = local.field_mut(0).unwrap().push_element();
    let parm = group.push_element();
    *parm.field_mut(0).unwrap().octets_mut() = vec![0x00, 0x00, 0x10, 0x01];
    *parm.field_mut(1).unwrap().push_element().octets_mut() = vec![0x01];

    msg
}

#[test]
fn ber_encode_matches_the_fixture() {
    let value = build_request();
    let env = CoderEnv::new(EncodingRule::Ber);
    let mut wire = Vec::new();
    env.encode(&value, &mut wire).unwrap();
    assert_eq!(FIXTURE, &wire[..]);
}

#[test]
fn ber_decode_rebuilds_the_request() {
    let env = CoderEnv::new(EncodingRule::Ber);
    let mut decoded = MEGACO_MESSAGE.new_value();
    env.decode(FIXTURE, &mut decoded, false).unwrap();
    assert_eq!(build_request(), decoded);

    let mut reencoded = Vec::new();
    env.encode(&decoded, &mut reencoded).unwrap();
    assert_eq!(FIXTURE, &reencoded[..]);
}

#[test]
fn three_way_ber_per_ber() {
    let mut env = CoderEnv::new(EncodingRule::Ber);
    let mut from_ber = MEGACO_MESSAGE.new_value();
    env.decode(FIXTURE, &mut from_ber, false).unwrap();

    env.set_rule(EncodingRule::PerAligned);
    let mut packed = Vec::new();
    env.encode(&from_ber, &mut packed).unwrap();
    let mut from_per = MEGACO_MESSAGE.new_value();
    env.decode(&packed, &mut from_per, false).unwrap();
    assert_eq!(from_ber, from_per);

    env.set_rule(EncodingRule::Ber);
    let mut wire = Vec::new();
    env.encode(&from_per, &mut wire).unwrap();
    assert_eq!(FIXTURE, &wire[..]);
}

#[test]
fn value_notation_round_trip() {
    let value = build_request();
    let text = value.to_value_notation().unwrap();
    assert!(text.contains("ip4Address : "));
    assert!(text.contains("address 'A4 30 33 EE'H"));
    assert!(text.contains("portNumber 5020"));

    let mut parsed = MEGACO_MESSAGE.new_value();
    parsed.from_value_notation(&text).unwrap();
    assert_eq!(value, parsed);
}

#[test]
fn request_is_strictly_valid() {
    let value = build_request();
    assert!(value.is_valid());
    assert!(value.is_strictly_valid());

    // Overflowing a SIZE(1..8) termination id is caught by validity,
    // not by encoding.
    let mut broken = build_request();
    let mess = broken.field_mut(1).unwrap();
    let transactions = mess.field_mut(2).unwrap().selected_mut().unwrap();
    let request = transactions.elements_mut()[0].selected_mut().unwrap();
    let action = &mut request.field_mut(1).unwrap().elements_mut()[0];
    let command = &mut action.field_mut(3).unwrap().elements_mut()[0];
    let add = command.field_mut(0).unwrap().selected_mut().unwrap();
    let termination = &mut add.field_mut(0).unwrap().elements_mut()[0];
    *termination.field_mut(1).unwrap().octets_mut() = vec![0; 9];
    assert!(!broken.is_strictly_valid());
}
