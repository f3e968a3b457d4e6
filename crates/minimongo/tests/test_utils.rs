//! Public API tests that need no server

use bson::{doc, Bson};
use minimongo::{configure, model, reset_defaults, to_underscore, AttrDict, FieldMap, Model};

model! {
    pub struct SomeModel;
}

#[tokio::test]
async fn test_nometa() {
    configure(|defaults| defaults.database = Some("test".to_string()));
    let binding = SomeModel::binding();
    reset_defaults();

    let binding = binding.expect("a model without declaration is fine");
    assert_eq!(binding.collection_name(), "some_model");
    assert_eq!(binding.database_name(), Some("test"));
}

#[test]
fn test_to_underscore() {
    assert_eq!(to_underscore("Foobar"), "foobar");
    assert_eq!(to_underscore("fooBar"), "foo_bar");
    assert_eq!(to_underscore("FooBar42"), "foo_bar42");
    assert_eq!(to_underscore("Foo42Bar"), "foo42_bar");
    assert_eq!(to_underscore("FOOBar"), "foo_bar");
    assert_eq!(to_underscore("fooBAR"), "foo_bar");
}

#[test]
fn test_attr_dict() {
    let mut d = AttrDict::new();
    d.set_attr("x", 1).unwrap();
    d.set_attr("y", doc! {}).unwrap();
    d.set_path("y.z", 2).unwrap();
    d.set_path("q.r", 3).unwrap();
    d.set_path("q.s.t", 4).unwrap();

    assert_eq!(d.attr("x").unwrap(), &Bson::Int32(1));
    assert_eq!(d.path("y.z").unwrap(), &Bson::Int32(2));
    assert_eq!(
        d.attr_dict("y").unwrap().item("z").unwrap(),
        d.path("y.z").unwrap()
    );
    assert_eq!(d.path("q.r").unwrap(), &Bson::Int32(3));
    assert_eq!(
        d.attr_dict("q").unwrap().attr_dict("s").unwrap().attr("t").unwrap(),
        &Bson::Int32(4)
    );

    let e = AttrDict::from(d.clone().into_document());
    assert_eq!(e, d);
    assert_eq!(e.path("q.s.t").unwrap(), &Bson::Int32(4));
}

#[test]
fn test_attr_dict_del() {
    let mut f = AttrDict::new();
    f.set_attr("x", 1).unwrap();
    f.del_attr("x").unwrap();
    assert!(f.attr("x").is_err());
    assert!(f.item("x").is_err());

    f.set_item("x", 1);
    f.del_item("x").unwrap();
    assert!(f.del_item("x").is_err());
    assert!(f.del_attr("x").is_err());
}

#[test]
fn test_attr_dict_with_field_map() {
    let field_map = FieldMap::new()
        .rule(|_, value| matches!(value, Bson::Int32(_)), |value| match value {
            Bson::Int32(n) => Bson::Int32(n * 5),
            other => other,
        });

    let mut mapped = AttrDict::with_field_map(doc! { "x": 1, "name": "a" }, field_map);
    assert_eq!(mapped.attr("x").unwrap(), &Bson::Int32(5));
    assert_eq!(mapped.attr("name").unwrap(), &Bson::String("a".to_string()));

    mapped.set_item("y", 5);
    assert_eq!(mapped.item("y").unwrap(), &Bson::Int32(25));

    mapped.set_attr("z", 2).unwrap();
    assert_eq!(mapped.attr("z").unwrap(), &Bson::Int32(10));
}
