use super::*;

fn shop() -> (TypeCatalog, HostTypeId, HostTypeId, HostTypeId) {
    let mut catalog = TypeCatalog::new();
    let customer = catalog.define("Customer");
    let vip = catalog.define_derived("VipCustomer", customer);
    let order = catalog.define("Order");
    catalog
        .reference(order, "Customer", customer)
        .collection(customer, "Orders", order)
        .scalar(order, "Total", ValueKind::Decimal);

    (catalog, customer, vip, order)
}

#[test]
fn members_are_inherited_from_base_types() {
    let (catalog, _, vip, order) = shop();

    let member = catalog.find_member(vip, "Orders").unwrap();
    assert!(member.is_collection());
    assert_eq!(member.navigation_target(), Some(order));
    assert!(catalog.find_member(vip, "Missing").is_none());
}

#[test]
fn assignability_follows_the_base_chain() {
    let (catalog, customer, vip, order) = shop();

    assert!(catalog.is_assignable_from(customer, vip));
    assert!(!catalog.is_assignable_from(vip, customer));
    assert!(!catalog.is_assignable_from(order, customer));
}

#[test]
fn scalar_members_cannot_navigate() {
    let (catalog, customer, vip, order) = shop();

    let total = catalog.find_member(order, "Total").unwrap().clone();
    assert!(!catalog.can_navigate_to(&total, customer));

    let to_customer = catalog.find_member(order, "Customer").unwrap().clone();
    assert!(catalog.can_navigate_to(&to_customer, vip));
    assert!(!catalog.can_navigate_to(&to_customer, order));
}

#[test]
fn types_resolve_by_name() {
    let (catalog, customer, _, _) = shop();

    assert_eq!(catalog.find_type("Customer"), Some(customer));
    assert_eq!(catalog.type_name(customer), Some("Customer"));
    assert_eq!(catalog.find_type("Nope"), None);
}
