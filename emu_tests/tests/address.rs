use emu_core::address::Address;

#[test]
fn parses_seg_off_and_linear_forms_to_the_same_address() {
    let from_seg_off = Address::parse("07C0:0100").unwrap();
    let from_linear = Address::parse("0x7D00").unwrap();
    assert_eq!(from_seg_off.linear, from_linear.linear);
}

#[test]
fn rejects_malformed_literals() {
    assert!(Address::parse("not-an-address").is_err());
    assert!(Address::parse("07C0:").is_err());
    assert!(Address::parse("").is_err());
}

#[test]
fn decimal_literal_is_treated_as_linear() {
    let addr = Address::parse("65536").unwrap();
    assert_eq!(addr.linear, 65536);
}
