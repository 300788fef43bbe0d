use apimodel_core::{cross_reference, finalize, Api, Enum, EnumValue, Field, Message, ModelError, Typez};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// A chain of messages `.p.M0 .. .p.M{n-1}`, each with one field pointing at
/// another message by index. Indexes past the end dangle.
fn api_with_links(links: &[usize]) -> Api {
    let mut api = Api::new("p");
    for (i, target) in links.iter().enumerate() {
        let id = format!(".p.M{i}");
        let mut message = Message::new(format!("M{i}"), &id, "p");
        let mut field = Field::new("link", format!("{id}.link"), Typez::Message);
        field.typez_id = format!(".p.M{target}");
        field.optional = true;
        message.fields.push(field);
        api.state.insert_message(message).unwrap();
        api.messages.push(id);
    }
    api
}

proptest! {
    #[test]
    fn dangling_references_are_all_reported(links in prop::collection::vec(0usize..12, 1..8)) {
        let api = api_with_links(&links);
        let dangling = links.iter().filter(|t| **t >= links.len()).count();
        match cross_reference(&api) {
            Ok(()) => prop_assert_eq!(dangling, 0),
            Err(ModelError::Aggregate(errors)) => prop_assert_eq!(errors.len(), dangling),
            Err(ModelError::UnresolvedReference { target, .. }) => {
                prop_assert_eq!(dangling, 1);
                prop_assert!(target.starts_with(".p.M"));
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn finalized_tables_reject_every_insert(links in prop::collection::vec(0usize..4, 4..6)) {
        let mut api = api_with_links(&links);
        finalize(&mut api).unwrap();
        let late = api.state.insert_message(Message::new("Late", ".p.Late", "p"));
        prop_assert!(
            matches!(late, Err(ModelError::Frozen { .. })),
            "insert into a frozen table succeeded"
        );
        let late_enum = api.state.insert_enum(Enum::new("E", ".p.E", "p"));
        prop_assert!(late_enum.is_err());
    }

    #[test]
    fn unique_values_keep_the_first_name_per_number(numbers in prop::collection::vec(-3i32..4, 0..12)) {
        let mut e = Enum::new("E", ".p.E", "p");
        for (i, number) in numbers.iter().enumerate() {
            e.values.push(EnumValue {
                name: format!("V{i}"),
                id: format!(".p.E.V{i}"),
                number: *number,
                ..Default::default()
            });
        }
        let unique = e.unique_values();
        let distinct: BTreeSet<_> = numbers.iter().collect();
        prop_assert_eq!(unique.len(), distinct.len());
        for value in unique {
            let first = numbers.iter().position(|n| *n == value.number).unwrap();
            prop_assert_eq!(&value.name, &format!("V{first}"));
        }
    }
}
