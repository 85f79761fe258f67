//! End-to-end session over the public surface: load a graph, run through the
//! visual modes, and check that fades, paths, constellations, and layout
//! transitions compose without leaking state between modes.

use constellate::engine::TRANSITION_MS;
use constellate::graph::LoadOptions;
use constellate::layout::compute;
use constellate::{ActiveMode, Engine, GraphModel, LayoutKind, LayoutParams};
use serde_json::json;

fn harbor_graph() -> GraphModel {
    let doc = json!({
        "meta": {
            "searchIndex": { "harbor": ["bl-1"] },
            "autoTagIndex": { "sea": ["bl-1", "bl-2"] },
            "sortedTimestamps": [[10, "bl-2"], [20, "bl-1"]]
        },
        "elements": {
            "nodes": [
                { "data": { "id": "ch-1", "type": "channel", "label": "Water" } },
                { "data": { "id": "ch-2", "type": "channel", "label": "Light" } },
                { "data": { "id": "bl-1", "type": "block", "label": "Harbor",
                            "class": "Image", "autoTags": ["sea"] } },
                { "data": { "id": "bl-2", "type": "block", "label": "Waves",
                            "class": "Text", "content": "…", "autoTags": ["sea"] } },
                { "data": { "id": "bl-3", "type": "block", "label": "Dawn" } }
            ],
            "edges": [
                { "data": { "source": "ch-1", "target": "bl-1" } },
                { "data": { "source": "ch-1", "target": "bl-2" } },
                { "data": { "source": "ch-2", "target": "bl-2" } },
                { "data": { "source": "ch-2", "target": "bl-3" } }
            ]
        }
    });
    GraphModel::load_value(doc, &LoadOptions::default()).expect("valid graph")
}

#[test]
fn full_session_flow() {
    let mut engine = Engine::new(harbor_graph());

    // initial layout is committed; everything visible
    assert!(engine.nodes().get_position(0).length() > 0.0);
    assert_eq!(engine.nodes().opacity(2), 1.0);

    // search narrows to bl-1
    engine.set_mode(ActiveMode::Search {
        term: "harbor".into(),
    });
    assert_eq!(engine.nodes().opacity(0), 1.0);
    assert_ne!(engine.nodes().opacity(2), 1.0);

    // path mode across the bridge block bl-2
    engine.set_mode(ActiveMode::Path {
        from: "bl-1".into(),
        to: "bl-3".into(),
    });
    let path = engine.model().shortest_path("bl-1", "bl-3");
    assert_eq!(path.len(), 5);

    // selection strings a constellation to the tag sibling
    engine.select(0);
    assert_eq!(engine.edges().constellation_count(), 1);

    // timeline transition lands on the timeline layout exactly, and the mode
    // switch drops the selection constellation
    engine.set_mode(ActiveMode::Timeline);
    assert_eq!(engine.edges().constellation_count(), 0);
    assert!(engine.is_animating());
    engine.frame(TRANSITION_MS);
    assert!(!engine.is_animating());
    let expected = compute(
        LayoutKind::Timeline,
        engine.model(),
        &LayoutParams::default(),
    );
    assert_eq!(engine.nodes().get_position(0), expected.block_positions[0]);

    // fades stay reversible across the whole session
    engine.set_mode(ActiveMode::Explore);
    for i in 0..engine.nodes().block_count() {
        assert_eq!(engine.nodes().opacity(i), 1.0);
    }
}
