use super::Logical::{False, True, Unknown};
use super::*;

#[test]
fn conjunction() {
    assert_eq!(True & Unknown, Unknown);
    assert_eq!(Unknown & True, Unknown);
    assert_eq!(False & Unknown, False);
    assert_eq!(Unknown & False, False);
    assert_eq!(Unknown & Unknown, Unknown);
    assert_eq!(True & True, True);
    assert_eq!(True & False, False);
}

#[test]
fn disjunction() {
    assert_eq!(True | Unknown, True);
    assert_eq!(Unknown | True, True);
    assert_eq!(False | Unknown, Unknown);
    assert_eq!(Unknown | Unknown, Unknown);
    assert_eq!(False | False, False);
}

#[test]
fn parity() {
    assert_eq!(Unknown ^ Unknown, Unknown);
    assert_eq!(True ^ Unknown, Unknown);
    assert_eq!(True ^ False, True);
    assert_eq!(True ^ True, False);
    assert_eq!(False ^ False, False);
}

#[test]
fn negated_conjunction() {
    assert_eq!(True.nand(True), False);
    assert_eq!(True.nand(False), True);
    assert_eq!(False.nand(Unknown), True);
    assert_eq!(True.nand(Unknown), Unknown);
}

#[test]
fn equivalence() {
    assert_eq!(True.eqv(True), True);
    assert_eq!(False.eqv(False), True);
    assert_eq!(True.eqv(False), False);
    assert_eq!(True.eqv(Unknown), Unknown);
    assert_eq!(Unknown.eqv(Unknown), Unknown);
}

#[test]
fn material_implication() {
    assert_eq!(True.imp(False, Implication::Material), False);
    assert_eq!(True.imp(True, Implication::Material), True);
    assert_eq!(False.imp(False, Implication::Material), True);
    assert_eq!(False.imp(Unknown, Implication::Material), True);
    assert_eq!(Unknown.imp(True, Implication::Material), True);
    assert_eq!(True.imp(Unknown, Implication::Material), Unknown);
    assert_eq!(Unknown.imp(False, Implication::Material), Unknown);
}

#[test]
fn relevant_implication() {
    assert_eq!(True.imp(True, Implication::Relevant), True);
    assert_eq!(True.imp(False, Implication::Relevant), False);
    assert_eq!(False.imp(True, Implication::Relevant), Unknown);
    assert_eq!(False.imp(False, Implication::Relevant), Unknown);
    assert_eq!(Unknown.imp(True, Implication::Relevant), Unknown);
}

#[test]
fn negation() {
    assert_eq!(!True, False);
    assert_eq!(!False, True);
    assert_eq!(!Unknown, Unknown);
}

#[test]
fn parse_words() {
    for word in &["t", "TRUE", "y", "Yes", "on"] {
        assert_eq!(word.parse::<Logical>().unwrap(), True);
    }
    for word in &["f", "False", "N", "no", "OFF"] {
        assert_eq!(word.parse::<Logical>().unwrap(), False);
    }
    for word in &["?", "unknown", "NULL", "none", " "] {
        assert_eq!(word.parse::<Logical>().unwrap(), Unknown);
    }
    assert!("maybe".parse::<Logical>().is_err());
}

#[test]
fn collation_matches_bytes() {
    assert!(False < True);
    assert!(True < Unknown);
    assert_eq!(True.to_string(), "T");
    assert_eq!(Unknown.byte(), b'?');
}
