//! Property tests for selector parsing and resolution.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use vigil::{resolve, DomSnapshot, ElementNode, ReadyState, Scope, Selector};

const TAGS: [&str; 5] = ["div", "ul", "li", "button", "span"];
const CLASSES: [&str; 3] = ["row", "active", "title"];

fn snapshot_strategy() -> impl Strategy<Value = DomSnapshot> {
    prop::collection::vec((0..TAGS.len(), prop::option::of(0..CLASSES.len()), any::<u16>()), 1..40)
        .prop_map(|specs| {
            let mut elements = vec![ElementNode::new(1, "body")];
            for (i, (tag, class, parent_seed)) in specs.into_iter().enumerate() {
                let id = i as u64 + 2;
                let parent = 1 + u64::from(parent_seed) % (id - 1);
                let mut node = ElementNode::new(id, TAGS[tag]).with_parent(parent);
                if let Some(class) = class {
                    node = node.with_attr("class", CLASSES[class]);
                }
                node = node.with_attr("data-test", format!("item-{id}"));
                elements.push(node);
            }
            DomSnapshot {
                url: "http://localhost:8080/".into(),
                title: "generated".into(),
                ready_state: ReadyState::Complete,
                elements,
            }
        })
}

fn selector_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "li",
        "ul > li",
        "div li",
        ".row",
        "li.active",
        "body > *",
        "div, span",
        "[data-test^=\"item-1\"]",
        "button[data-test=\"item-",
        "ul li.title",
    ])
    .prop_map(str::to_string)
}

proptest! {
    #[test]
    fn parse_never_panics(source in ".{0,64}") {
        let _ = Selector::parse(&source);
    }

    #[test]
    fn parse_never_panics_on_selector_alphabet(source in "[a-z#.\\[\\]=\"'^$*~|>, :-]{0,32}") {
        let _ = Selector::parse(&source);
    }

    #[test]
    fn resolution_is_deterministic(snapshot in snapshot_strategy(), source in selector_strategy()) {
        let selector = Selector::parse(&source).unwrap();
        let first = resolve(&selector, Scope::Document, &snapshot);
        let second = resolve(&selector, Scope::Document, &snapshot);
        prop_assert_eq!(&first, &second);
    }

    #[test]
    fn resolution_is_in_document_order_without_duplicates(
        snapshot in snapshot_strategy(),
        source in selector_strategy(),
    ) {
        let selector = Selector::parse(&source).unwrap();
        let ids: Vec<u64> = resolve(&selector, Scope::Document, &snapshot)
            .iter()
            .map(|h| h.id)
            .collect();
        prop_assert!(ids.windows(2).all(|w| w[0] < w[1]), "{:?}", ids);
    }

    #[test]
    fn every_result_matches_the_selector(snapshot in snapshot_strategy(), source in selector_strategy()) {
        let selector = Selector::parse(&source).unwrap();
        for handle in resolve(&selector, Scope::Document, &snapshot) {
            let node = snapshot.get(handle.id).unwrap();
            prop_assert!(selector.matches(node, &snapshot));
        }
    }

    #[test]
    fn open_value_matches_by_prefix(value in "[a-z][a-z0-9-]{0,15}", cut in 0usize..16) {
        let prefix = &value[..cut.min(value.len())];
        let snapshot = DomSnapshot {
            url: "http://localhost:8080/".into(),
            title: String::new(),
            ready_state: ReadyState::Complete,
            elements: vec![
                ElementNode::new(1, "body"),
                ElementNode::new(2, "button").with_parent(1).with_attr("data-test", value.as_str()),
            ],
        };
        let selector = Selector::parse(&format!("button[data-test=\"{prefix}")).unwrap();
        prop_assert_eq!(resolve(&selector, Scope::Document, &snapshot).len(), 1);
    }
}
