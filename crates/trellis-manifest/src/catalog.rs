//! Contract tables: allowed keys, kinds, and version gates. Gating lives
//! here as data so the validator stays free of version conditionals.

pub const ALLOWED_FIELD_TYPES: &[&str] = &[
    "string",
    "text",
    "number",
    "bool",
    "date",
    "datetime",
    "enum",
    "uuid",
    "lookup",
    "tags",
    "attachments",
];

pub const ALLOWED_V1_TOP_KEYS: &[&str] = &[
    "manifest_version",
    "module",
    "entities",
    "views",
    "relations",
    "workflows",
    "actions",
    "triggers",
    "queries",
    "interfaces",
    "app",
    "pages",
    "modals",
];

pub const ALLOWED_V1_APP_KEYS: &[&str] = &["home", "nav", "defaults"];
pub const ALLOWED_V1_NAV_GROUP_KEYS: &[&str] = &["group", "items"];
pub const ALLOWED_V1_NAV_ITEM_KEYS: &[&str] = &["label", "to"];
pub const ALLOWED_V1_PAGE_KEYS: &[&str] = &["id", "title", "layout", "header", "content", "breadcrumbs"];
pub const ALLOWED_V1_PAGE_HEADER_KEYS: &[&str] = &["actions", "variant"];
pub const ALLOWED_V1_PAGE_ACTION_KEYS: &[&str] = &[
    "kind",
    "label",
    "target",
    "action_id",
    "enabled_when",
    "visible_when",
    "confirm",
    "modal_id",
];

pub const ALLOWED_V1_BLOCK_KEYS: &[&str] = &[
    "kind",
    "target",
    "content",
    "items",
    "columns",
    "gap",
    "tabs",
    "style",
    "default_tab",
    "text",
    "entity_id",
    "record_ref",
    "variant",
    "title",
    "actions",
    "align",
    "field_id",
    "mode",
    "record_id_query",
    "modes",
    "default_mode",
    "default_group_by",
    "default_filter_id",
    "record_domain",
    "view",
    "create_defaults",
    "create_modal",
];

pub const ALLOWED_V1_ACTION_KINDS: &[&str] = &[
    "navigate",
    "open_form",
    "refresh",
    "create_record",
    "update_record",
    "bulk_update",
];

pub const ALLOWED_V1_TRIGGER_KEYS: &[&str] = &["id", "event", "entity_id", "action_id", "status_field"];
pub const ALLOWED_V1_TRIGGER_EVENTS: &[&str] = &[
    "record.created",
    "record.updated",
    "action.clicked",
    "workflow.status_changed",
];

pub const ALLOWED_V1_STACK_KEYS: &[&str] = &["kind", "gap", "content"];
pub const ALLOWED_V1_GRID_KEYS: &[&str] = &["kind", "columns", "gap", "items"];
pub const ALLOWED_V1_GRID_ITEM_KEYS: &[&str] = &["span", "content"];
pub const ALLOWED_V1_TABS_KEYS: &[&str] = &["kind", "style", "tabs", "default_tab"];
pub const ALLOWED_V1_TAB_KEYS: &[&str] = &["id", "label", "content"];
pub const ALLOWED_V1_TEXT_KEYS: &[&str] = &["kind", "text"];
pub const ALLOWED_V1_CHATTER_KEYS: &[&str] = &["kind", "entity_id", "record_ref"];
pub const ALLOWED_V1_CONTAINER_KEYS: &[&str] = &["kind", "variant", "title", "content"];
pub const ALLOWED_V1_TOOLBAR_KEYS: &[&str] = &["kind", "align", "actions"];
pub const ALLOWED_V1_STATUSBAR_KEYS: &[&str] = &["kind", "entity_id", "record_ref", "field_id", "mode"];
pub const ALLOWED_V1_RECORD_KEYS: &[&str] = &["kind", "entity_id", "record_id_query", "content"];
pub const ALLOWED_V1_VIEW_MODES_KEYS: &[&str] = &[
    "kind",
    "entity_id",
    "modes",
    "default_mode",
    "default_group_by",
    "default_filter_id",
    "record_domain",
];
pub const ALLOWED_V1_RELATED_LIST_KEYS: &[&str] = &[
    "kind",
    "entity_id",
    "target",
    "view",
    "record_domain",
    "create_defaults",
    "create_modal",
];
pub const ALLOWED_V1_VIEW_MODE_ITEM_KEYS: &[&str] = &["mode", "target", "default_group_by"];
pub const ALLOWED_VIEW_MODE_IDS: &[&str] = &["list", "kanban", "graph", "pivot", "calendar"];

pub const MAX_BLOCK_DEPTH: usize = 6;
pub const MAX_CONDITION_DEPTH: usize = 6;

pub const ALLOWED_WORKFLOW_KEYS: &[&str] = &[
    "id",
    "entity",
    "status_field",
    "states",
    "transitions",
    "required_fields_by_state",
];
pub const ALLOWED_WORKFLOW_STATE_KEYS: &[&str] = &["id", "label", "order", "required_fields"];
pub const ALLOWED_WORKFLOW_TRANSITION_KEYS: &[&str] = &["from", "to", "label"];

pub const ALLOWED_CONDITION_OPS: &[&str] = &[
    "eq", "neq", "gt", "gte", "lt", "lte", "in", "contains", "exists", "and", "or", "not",
];
pub const ALLOWED_CONDITION_KEYS: &[&str] = &[
    "op",
    "field",
    "value",
    "left",
    "right",
    "conditions",
    "condition",
];

pub const ALLOWED_V1_ACTION_KEYS: &[&str] = &[
    "id",
    "kind",
    "label",
    "target",
    "entity_id",
    "defaults",
    "patch",
    "enabled_when",
    "visible_when",
    "confirm",
    "modal_id",
];

pub const ALLOWED_V1_VIEW_HEADER_KEYS: &[&str] = &[
    "title_field",
    "primary_actions",
    "secondary_actions",
    "search",
    "filters",
    "bulk_actions",
    "save_mode",
    "open_record_target",
    "auto_save",
    "auto_save_debounce_ms",
    "statusbar",
    "tabs",
];
pub const ALLOWED_V1_VIEW_HEADER_ACTION_KEYS: &[&str] = &[
    "action_id",
    "kind",
    "label",
    "target",
    "enabled_when",
    "visible_when",
    "confirm",
    "modal_id",
];
pub const ALLOWED_V1_VIEW_HEADER_SEARCH_KEYS: &[&str] = &["enabled", "placeholder", "fields"];
pub const ALLOWED_V1_VIEW_HEADER_FILTER_KEYS: &[&str] = &["id", "label", "domain"];
pub const ALLOWED_V1_VIEW_ACTIVITY_KEYS: &[&str] = &[
    "enabled",
    "mode",
    "tab_label",
    "allow_comments",
    "allow_attachments",
    "show_changes",
    "tracked_fields",
];
pub const ALLOWED_V1_VIEW_CARD_KEYS: &[&str] = &["title_field", "subtitle_fields", "badge_fields"];
pub const ALLOWED_V1_GRAPH_DEFAULT_KEYS: &[&str] = &["type", "group_by", "measure"];

pub const ALLOWED_V1_MODAL_KEYS: &[&str] = &[
    "id",
    "title",
    "description",
    "entity_id",
    "fields",
    "defaults",
    "actions",
];
pub const ALLOWED_V1_MODAL_ACTION_KEYS: &[&str] = &[
    "action_id",
    "kind",
    "label",
    "target",
    "entity_id",
    "defaults",
    "patch",
    "enabled_when",
    "visible_when",
    "confirm",
    "close_on_success",
    "variant",
];

/// Minimum manifest version per block kind. Kinds missing here (`view`) are
/// available at every version.
pub const BLOCK_KIND_GATES: &[(&str, &str)] = &[
    ("stack", "1.1"),
    ("grid", "1.1"),
    ("tabs", "1.1"),
    ("text", "1.1"),
    ("chatter", "1.2"),
    ("container", "1.3"),
    ("toolbar", "1.3"),
    ("statusbar", "1.3"),
    ("record", "1.3"),
    ("view_modes", "1.3"),
    ("related_list", "1.3"),
];

/// Minimum version for declarative conditions (`visible_when`, domains, ...).
pub const CONDITION_GATE: &str = "1.2";
/// Minimum version for per-field `ui` hints.
pub const FIELD_UI_GATE: &str = "1.2";
/// Minimum version for form section layouts.
pub const SECTION_LAYOUT_GATE: &str = "1.3";

pub fn block_kind_gate(kind: &str) -> Option<&'static str> {
    BLOCK_KIND_GATES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, gate)| *gate)
}
