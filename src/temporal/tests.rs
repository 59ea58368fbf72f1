use super::*;

#[test]
fn empty_sorts_below_every_real_date() {
    let empty = Date::empty();
    let real = Date::new(1, 1, 1).unwrap();
    assert!(empty < real);
    assert!(empty <= real);
    assert!(!(empty > real));
    assert!(!(empty >= real));
    assert!(empty != real);
}

#[test]
fn empty_equals_only_empty() {
    let a = Date::empty();
    let b = Date::empty();
    assert!(a == b);
    assert!(a <= b);
    assert!(a >= b);
    assert!(!(a < b));
    assert!(!(a > b));
}

#[test]
fn ymd_round_trip() {
    let date = Date::from_ymd("20200229").unwrap();
    assert_eq!(date, Date::new(2020, 2, 29).unwrap());
    assert_eq!(date.ymd(), "20200229");
}

#[test]
fn blank_ymd_is_empty() {
    assert!(Date::from_ymd("        ").unwrap().is_empty());
    assert!(Date::from_ymd("").unwrap().is_empty());
    assert!(Date::from_ymd("no date").unwrap().is_empty());
    assert_eq!(Date::empty().ymd(), "        ");
}

#[test]
fn bad_ymd_is_rejected() {
    assert!(Date::from_ymd("2020130a").is_err());
    assert!(Date::from_ymd("20201340").is_err());
}

#[test]
fn attribute_access_on_empty_fails() {
    let err = Date::empty().year().unwrap_err();
    assert!(err.to_string().contains("null Date"));
    assert!(Time::empty().hour().is_err());
    assert!(DateTime::empty().minute().is_err());
}

#[test]
fn duration_arithmetic() {
    let date = Date::new(2020, 2, 28).unwrap();
    assert_eq!(date + Duration::days(1), Date::new(2020, 2, 29).unwrap());
    assert_eq!(date - Duration::days(28), Date::new(2020, 1, 31).unwrap());
    let later = Date::new(2020, 3, 1).unwrap();
    assert_eq!(later - date, Some(Duration::days(2)));
    assert_eq!(later - Date::empty(), None);
    assert!((Date::empty() + Duration::days(5)).is_empty());
}

#[test]
fn ordinal_round_trip() {
    let date = Date::new(2020, 2, 29).unwrap();
    let ordinal = date.ordinal().unwrap();
    assert_eq!(Date::from_ordinal(ordinal), date);
    assert!(Date::from_ordinal(0).is_empty());
}

#[test]
fn combine_is_empty_when_either_part_is() {
    let date = Date::new(2020, 2, 29).unwrap();
    let time = Time::new(13, 0, 0, 0).unwrap();
    let both = DateTime::combine(date, time);
    assert_eq!(both.hour().unwrap(), 13);
    assert_eq!(both.date(), date);
    assert!(DateTime::combine(Date::empty(), time).is_empty());
    assert!(DateTime::combine(date, Time::empty()).is_empty());
}

#[test]
fn datetime_ordering_treats_empty_as_least() {
    let real = DateTime::new(1981, 1, 1, 0, 0, 0, 0).unwrap();
    assert!(DateTime::empty() < real);
    assert!(DateTime::empty() == DateTime::empty());
}

#[test]
fn display_forms() {
    assert_eq!(Date::empty().to_string(), "no date");
    assert_eq!(Date::new(2020, 2, 29).unwrap().to_string(), "2020-02-29");
    assert_eq!(Time::empty().to_string(), "no time");
    assert_eq!(DateTime::empty().to_string(), "no datetime");
}
