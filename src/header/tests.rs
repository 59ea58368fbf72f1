use super::*;

fn descriptor(name: &[u8], kind: u8, length: u8) -> [u8; 32] {
    let mut frame = [0u8; 32];
    frame[..name.len()].copy_from_slice(name);
    frame[11] = kind;
    frame[16] = length;
    frame
}

#[test]
fn blank_header_shape() {
    let header = TableHeader::new();
    assert_eq!(header.start(), 33);
    assert_eq!(header.record_length(), 1);
    assert_eq!(header.record_count(), 0);
    assert_eq!(header.field_count().unwrap(), 0);
}

#[test]
fn prefix_must_be_32_bytes() {
    assert!(TableHeader::from_bytes(&[0u8; 31]).is_err());
    assert!(TableHeader::from_bytes(&[0u8; 32]).is_ok());
}

#[test]
fn set_fields_recomputes_derived_values() {
    let mut header = TableHeader::new();
    let mut block = Vec::new();
    block.extend_from_slice(&descriptor(b"NAME", b'C', 25));
    block.extend_from_slice(&descriptor(b"AGE", b'N', 3));
    header.set_fields(&block).unwrap();

    assert_eq!(header.field_count().unwrap(), 2);
    assert_eq!(header.record_length(), 1 + 25 + 3);
    assert_eq!(header.start(), 32 + 64 + 1);
    assert_eq!(header.fields().unwrap(), &block[..]);
}

#[test]
fn set_fields_rejects_ragged_blocks() {
    let mut header = TableHeader::new();
    assert!(header.set_fields(&[0u8; 33]).is_err());
}

#[test]
fn extra_region_moves_start() {
    let mut header = TableHeader::new();
    header.set_fields(&descriptor(b"NAME", b'C', 10)).unwrap();
    header.set_extra(&[0u8; 263]).unwrap();
    assert_eq!(header.start(), 32 + 32 + 1 + 263);
    assert_eq!(header.extra().unwrap().len(), 263);
    // replacing the extra region does not disturb the field block
    assert_eq!(header.field_count().unwrap(), 1);
}

#[test]
fn record_count_round_trip() {
    let mut header = TableHeader::new();
    header.set_record_count(70_000).unwrap();
    assert_eq!(header.record_count(), 70_000);
}

#[test]
fn data_stamps_modification_date() {
    let mut header = TableHeader::new();
    let bytes = header.data().unwrap().to_vec();
    assert_ne!(&bytes[1..4], &[0, 0, 0]);
    let today = Date::today();
    assert_eq!(header.update(), today);
}

#[test]
fn version_and_codepage_bytes() {
    let mut header = TableHeader::new();
    header.set_version(0x83);
    header.set_codepage(0xc9);
    assert_eq!(header.version(), 0x83);
    assert_eq!(header.codepage(), 0xc9);
}
