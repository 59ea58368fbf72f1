use super::*;

use crate::codec::{self, ByteOrder};

#[test]
fn pack_integers_with_explicit_byte_order() {
    assert_eq!(codec::pack_u16(0x0102, ByteOrder::Little).unwrap(), [0x02, 0x01]);
    assert_eq!(codec::pack_u16(0x0102, ByteOrder::Big).unwrap(), [0x01, 0x02]);
    assert_eq!(
        codec::pack_u32(0x01020304, ByteOrder::Little).unwrap(),
        [0x04, 0x03, 0x02, 0x01]
    );
    assert_eq!(
        codec::pack_u32(0x01020304, ByteOrder::Big).unwrap(),
        [0x01, 0x02, 0x03, 0x04]
    );
}

#[test]
fn unpack_inverts_pack() {
    let two = codec::pack_u16(65_535, ByteOrder::Big).unwrap();
    assert_eq!(codec::unpack_u16(&two, ByteOrder::Big).unwrap(), 65_535);
    let four = codec::pack_u32(70_000, ByteOrder::Little).unwrap();
    assert_eq!(codec::unpack_u32(&four, ByteOrder::Little).unwrap(), 70_000);
    assert!(codec::unpack_u16(&[1, 2, 3], ByteOrder::Little).is_err());
}

#[test]
fn pack_overflow_names_the_limit() {
    let err = codec::pack_u16(65_536, ByteOrder::Little).unwrap_err();
    match err {
        DbfError::DataOverflow { message, data } => {
            assert!(message.contains("65535"));
            assert_eq!(data, "65536");
        }
        other => panic!("expected DataOverflow, got {:?}", other),
    }
    assert!(codec::pack_u32(4_294_967_296, ByteOrder::Big).is_err());
}

#[test]
fn packed_dates() {
    assert_eq!(codec::pack_date(2020, 2, 29).unwrap(), [120, 2, 29]);
    assert_eq!(codec::unpack_date(&[120, 2, 29]).unwrap(), (2020, 2, 29));
    assert!(codec::pack_date(1899, 12, 31).is_err());
}

#[test]
fn name_frames() {
    assert_eq!(&codec::pack_name("wisdom").unwrap(), b"WISDOM\0\0\0\0\0");
    assert_eq!(codec::unpack_name(b"WISDOM\0\0\0\0\0"), "wisdom");
    assert!(codec::pack_name("elevenchars").is_err());
}

#[test]
fn version_bytes_map_to_types() {
    assert_eq!(DbfType::parse_type(0x03), DbfType::DBase3);
    assert_eq!(DbfType::parse_type(0x83), DbfType::DBase3Memo);
    assert_eq!(DbfType::parse_type(0x30), DbfType::VisualFoxPro);
    assert_eq!(DbfType::parse_type(0xf5), DbfType::FoxProMemo);
    assert_eq!(DbfType::parse_type(0xff), DbfType::Undefined);
    assert_eq!(DbfType::parse_type(0x83).dialects(), &[Dialect::Db3]);
    assert!(DbfType::parse_type(0x04).dialects().is_empty());
}

#[test]
fn dialect_version_bytes() {
    assert_eq!(Dialect::Db3.version_byte(false), 0x03);
    assert_eq!(Dialect::Db3.version_byte(true), 0x83);
    assert_eq!(Dialect::Fp.version_byte(true), 0xf5);
    assert_eq!(Dialect::Vfp.version_byte(false), 0x30);
    assert_eq!(Dialect::Vfp.version_byte(true), 0x30);
}

#[test]
fn codepage_registry() {
    let cp = codepage_lookup(0x03).unwrap();
    assert_eq!(cp.name, "cp1252");
    assert_eq!(cp.encoding().unwrap(), encoding_rs::WINDOWS_1252);

    let cp = codepage_by_name("cp1251").unwrap();
    assert_eq!(cp.byte, 0xc9);

    assert!(codepage_lookup(0x05).is_err());
}

#[test]
fn known_but_undecodable_codepage_fails_with_its_byte() {
    let cp = codepage_lookup(0x01).unwrap();
    let err = cp.encoding().unwrap_err();
    assert!(err.to_string().contains("0x01"));
}

#[test]
fn mac_and_cyrillic_pages_resolve() {
    assert_eq!(codepage_lookup(0x04).unwrap().encoding().unwrap(), encoding_rs::MACINTOSH);
    assert_eq!(codepage_lookup(0x65).unwrap().encoding().unwrap(), encoding_rs::IBM866);
    assert_eq!(codepage_lookup(0xc8).unwrap().encoding().unwrap(), encoding_rs::WINDOWS_1250);
}
