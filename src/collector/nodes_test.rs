use super::*;

use crate::collector::panel::{Panel, PanelOptions};
use crate::host::MemoryGraph;
use crate::services::notify::Notifier;
use crate::services::persistence::MemoryStore;

fn graph() -> MemoryGraph {
    let graph = MemoryGraph::new();
    for id in [3, 5, 8] {
        graph.add_node(NodeId(id));
    }
    graph
}

fn panel(graph: &MemoryGraph, registry: &ActiveRegistry) -> NodePanel {
    NodePanel::new(Arc::new(graph.clone()), registry, NodePanelOptions::new())
}

fn mode(graph: &MemoryGraph, node: u64) -> NodeMode {
    graph.node_mode(NodeId(node)).unwrap()
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn add_node_applies_mode_and_rejects_duplicates() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());

    assert!(panel.add_node(NodeId(3), None, None));
    assert!(panel.add_node(NodeId(5), Some(false), None));
    assert!(!panel.add_node(NodeId(5), Some(true), None));
    assert!(!panel.add_node(NodeId(99), None, None));

    assert_eq!(panel.nodes(), vec![NodeId(3), NodeId(5)]);
    assert_eq!(mode(&graph, 3), NodeMode::Always);
    assert_eq!(mode(&graph, 5), NodeMode::Bypass);
    assert_eq!(panel.disabled_mode(NodeId(5)), Some(NodeMode::Bypass));
}

#[test]
fn toggle_switches_between_running_and_disabled_mode() {
    let graph = graph();
    let panel = NodePanel::new(
        Arc::new(graph.clone()),
        &ActiveRegistry::new(),
        NodePanelOptions::new().with_default_disabled_mode(NodeMode::Mute),
    );
    panel.add_node(NodeId(3), None, None);

    assert!(panel.set_enabled(NodeId(3), false));
    assert_eq!(mode(&graph, 3), NodeMode::Mute);
    assert!(panel.set_enabled(NodeId(3), true));
    assert_eq!(mode(&graph, 3), NodeMode::Always);
    assert!(!panel.set_enabled(NodeId(8), false));
}

#[test]
fn removing_and_disposing_restore_normal_mode() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());
    panel.add_node(NodeId(3), Some(false), None);
    panel.add_node(NodeId(5), Some(false), Some(NodeMode::Mute));
    panel.add_node(NodeId(8), Some(false), None);

    assert!(panel.remove_node(NodeId(3)));
    assert_eq!(mode(&graph, 3), NodeMode::Always);
    assert!(!panel.remove_node(NodeId(3)));

    panel.dispose();
    assert_eq!(mode(&graph, 5), NodeMode::Always);
    assert_eq!(mode(&graph, 8), NodeMode::Always);
    assert!(panel.is_empty());
    assert!(!panel.add_node(NodeId(3), None, None));
}

#[test]
fn deleted_nodes_are_pruned_on_add() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());
    panel.add_node(NodeId(3), None, None);
    panel.add_node(NodeId(5), None, None);

    graph.remove_node(NodeId(3));
    assert!(panel.add_node(NodeId(8), None, None));
    assert_eq!(panel.nodes(), vec![NodeId(5), NodeId(8)]);
}

#[test]
fn changing_default_rewrites_disabled_nodes() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());
    panel.add_node(NodeId(3), Some(false), None);
    panel.add_node(NodeId(5), Some(true), None);

    panel.set_default_disabled_mode(NodeMode::Mute);

    assert_eq!(panel.default_disabled_mode(), NodeMode::Mute);
    assert_eq!(panel.disabled_mode(NodeId(5)), Some(NodeMode::Mute));
    assert_eq!(mode(&graph, 3), NodeMode::Mute);
    assert_eq!(mode(&graph, 5), NodeMode::Always);
}

#[test]
fn reorder_moves_nodes() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());
    for id in [3, 5, 8] {
        panel.add_node(NodeId(id), None, None);
    }

    assert!(panel.reorder(NodeId(8), Reorder::Top));
    assert_eq!(panel.nodes(), vec![NodeId(8), NodeId(3), NodeId(5)]);
    assert!(!panel.reorder(NodeId(8), Reorder::Up));
    assert!(panel.reorder(NodeId(3), Reorder::Bottom));
    assert_eq!(panel.nodes(), vec![NodeId(8), NodeId(5), NodeId(3)]);
}

// =============================================================================
// ACTIVE MODE
// =============================================================================

#[test]
fn active_panel_refuses_toggles_and_leaves_modes() {
    let graph = graph();
    let panel = panel(&graph, &ActiveRegistry::new());
    panel.add_node(NodeId(3), Some(false), None);

    panel.set_active(true);
    assert_eq!(panel.is_read_only(NodeId(3)), Some(true));
    assert!(!panel.set_enabled(NodeId(3), true));
    assert_eq!(mode(&graph, 3), NodeMode::Bypass);

    panel.set_active(false);
    assert_eq!(panel.is_read_only(NodeId(3)), Some(false));
    assert!(panel.set_enabled(NodeId(3), true));
}

#[test]
fn node_and_widget_panels_share_one_active_slot() {
    let graph = graph();
    graph.set_field(NodeId(3), "seed", serde_json::json!(1));
    let registry = ActiveRegistry::new();
    let nodes = panel(&graph, &registry);
    let widgets = Panel::new(Arc::new(graph.clone()), &registry, PanelOptions::new());

    nodes.set_active(true);
    widgets.set_active(true);
    assert!(!nodes.is_active());
    assert!(widgets.is_active());

    nodes.set_active(true);
    assert!(nodes.is_active());
    assert!(!widgets.is_active());
}

// =============================================================================
// SNAPSHOT / RESTORE
// =============================================================================

#[test]
fn restore_reproduces_order_modes_and_active_flag() {
    let graph = graph();
    let registry = ActiveRegistry::new();
    let original = panel(&graph, &registry);
    original.set_default_disabled_mode(NodeMode::Mute);
    original.add_node(NodeId(8), Some(false), Some(NodeMode::Bypass));
    original.add_node(NodeId(3), Some(true), None);
    original.set_active(true);
    let saved = original.snapshot();
    original.dispose();

    let fresh = panel(&graph, &registry);
    assert_eq!(fresh.restore(&saved), 2);
    assert_eq!(fresh.snapshot(), saved);
    assert!(fresh.is_active());
    assert_eq!(mode(&graph, 8), NodeMode::Bypass);
    assert_eq!(fresh.default_disabled_mode(), NodeMode::Mute);
}

#[tokio::test]
async fn restore_drops_deleted_nodes_with_warning() {
    let graph = graph();
    let notifier = Notifier::new();
    let mut notices = notifier.subscribe();
    let persister = Persister::new(Arc::new(MemoryStore::new()), notifier);
    let panel = NodePanel::new(
        Arc::new(graph.clone()),
        &ActiveRegistry::new(),
        NodePanelOptions::new().with_persister(persister),
    );
    let saved = NodePanelSnapshot {
        entries: vec![
            NodeSnapshotEntry { node: NodeId(42), enabled: false, disabled_mode: NodeMode::Mute },
            NodeSnapshotEntry { node: NodeId(5), enabled: false, disabled_mode: NodeMode::Mute },
        ],
        ..NodePanelSnapshot::default()
    };

    assert_eq!(panel.restore(&saved), 1);
    assert_eq!(panel.nodes(), vec![NodeId(5)]);
    assert_eq!(mode(&graph, 5), NodeMode::Mute);
    assert_eq!(notices.try_recv().unwrap().level, crate::services::notify::NoticeLevel::Warning);
}

#[tokio::test]
async fn toggles_are_persisted() {
    let graph = graph();
    let store = MemoryStore::new();
    let persister = Persister::new(Arc::new(store.clone()), Notifier::new());
    let panel = NodePanel::new(
        Arc::new(graph.clone()),
        &ActiveRegistry::new(),
        NodePanelOptions::new().with_persister(persister.clone()).with_table("nodes-main"),
    );
    panel.add_node(NodeId(3), None, None);
    panel.set_enabled(NodeId(3), false);
    persister.flush().await;

    let stored = NodePanelSnapshot::from_document(store.get("nodes-main").unwrap()).unwrap();
    assert_eq!(stored, panel.snapshot());
    assert!(!stored.entries[0].enabled);
}
