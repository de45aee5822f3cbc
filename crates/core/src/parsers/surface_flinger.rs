//! Built-in surface-flinger layers trace: schema, flag dictionaries and
//! trace format.
//!
//! The schema covers the subset of `layerstrace.proto` / `layers.proto` /
//! `display.proto` the engine reads. Unknown fields in real traces are
//! skipped by the decoder.

use protobuf::descriptor::FileDescriptorProto;

use super::format::{ChildContainer, ComputationKind, HierarchyFormat, TraceFormat};
use crate::decoder::ContainerFormat;
use crate::operations::IntDefMap;
use crate::schema::builder::{EnumBuilder, FieldType, FileBuilder, MessageBuilder};
use crate::schema::{FieldSelection, SchemaError, SchemaOptions, SchemaRegistry};

pub const PACKAGE: &str = "android.surfaceflinger";
pub const MAGIC: &[u8] = b"\x09LYRTRACE";
/// Extension number of the `(android.typedef)` field option.
pub const TYPEDEF_OPTION: u32 = 58000;

pub const TRACE_FILE: &str = "android.surfaceflinger.LayersTraceFileProto";
pub const ENTRY: &str = "android.surfaceflinger.LayersTraceProto";
pub const LAYER: &str = "android.surfaceflinger.LayerProto";

fn t(name: &str) -> FieldType {
    FieldType::message(&format!("{PACKAGE}.{name}"))
}

fn m(name: &str) -> MessageBuilder {
    MessageBuilder::new(&format!("{PACKAGE}.{name}"))
}

fn geometry(file: FileBuilder) -> FileBuilder {
    use FieldType::{Float, Int32, UInt32, UInt64};
    file.message(
        m("RectProto")
            .field("left", 1, Int32)
            .field("top", 2, Int32)
            .field("right", 3, Int32)
            .field("bottom", 4, Int32),
    )
    .message(
        m("FloatRectProto")
            .field("left", 1, Float)
            .field("top", 2, Float)
            .field("right", 3, Float)
            .field("bottom", 4, Float),
    )
    .message(
        m("ColorProto")
            .field("r", 1, Float)
            .field("g", 2, Float)
            .field("b", 3, Float)
            .field("a", 4, Float),
    )
    .message(m("SizeProto").field("w", 1, Int32).field("h", 2, Int32))
    .message(m("PositionProto").field("x", 1, Float).field("y", 2, Float))
    .message(
        m("RegionProto")
            .field("id", 1, UInt64)
            .repeated("rect", 2, t("RectProto")),
    )
    .message(
        m("TransformProto")
            .field("dsdx", 1, Float)
            .field("dtdx", 2, Float)
            .field("dsdy", 3, Float)
            .field("dtdy", 4, Float)
            .field("type", 5, Int32),
    )
    .message(
        m("ActiveBufferProto")
            .field("width", 1, UInt32)
            .field("height", 2, UInt32)
            .field("stride", 3, UInt32)
            .field("format", 4, Int32),
    )
}

fn layer(file: FileBuilder) -> FileBuilder {
    use FieldType::{Bool, Float, Int32, String, UInt32};
    file.enumeration(
        EnumBuilder::new("HwcCompositionType")
            .value("INVALID", 0)
            .value("CLIENT", 1)
            .value("DEVICE", 2)
            .value("SOLID_COLOR", 3)
            .value("CURSOR", 4)
            .value("SIDEBAND", 5),
    )
    .message(
        m("InputWindowInfoProto")
            .field("layout_params_flags", 1, UInt32)
            .with_option(TYPEDEF_OPTION, "WindowFlags")
            .field("layout_params_type", 2, Int32)
            .field("frame", 3, t("RectProto"))
            .field("touchable_region", 4, t("RegionProto"))
            .field("visible", 6, Bool)
            .field("focusable", 8, Bool)
            .field("input_config", 17, UInt32),
    )
    .message(
        m("LayerProto")
            .field("id", 1, Int32)
            .field("name", 2, String)
            .repeated("children", 3, Int32)
            .repeated("relatives", 4, Int32)
            .field("type", 5, String)
            .field("transparent_region", 6, t("RegionProto"))
            .field("visible_region", 7, t("RegionProto"))
            .field("damage_region", 8, t("RegionProto"))
            .field("layer_stack", 9, UInt32)
            .field("z", 10, Int32)
            .field("position", 11, t("PositionProto"))
            .field("requested_position", 12, t("PositionProto"))
            .field("size", 13, t("SizeProto"))
            .field("crop", 14, t("RectProto"))
            .field("is_opaque", 16, Bool)
            .field("dataspace", 18, String)
            .field("pixel_format", 19, String)
            .field("color", 20, t("ColorProto"))
            .field("requested_color", 21, t("ColorProto"))
            .field("flags", 22, UInt32)
            .with_option(TYPEDEF_OPTION, "LayerFlags")
            .field("transform", 23, t("TransformProto"))
            .field("requested_transform", 24, t("TransformProto"))
            .field("parent", 25, Int32)
            .with_default("-1")
            .field("z_order_relative_of", 26, Int32)
            .with_default("-1")
            .field("active_buffer", 27, t("ActiveBufferProto"))
            .field("queued_frames", 28, Int32)
            .field("hwc_frame", 30, t("RectProto"))
            .field("hwc_crop", 31, t("FloatRectProto"))
            .field("hwc_transform", 32, Int32)
            .field("hwc_composition_type", 35, FieldType::enumeration(&format!("{PACKAGE}.HwcCompositionType")))
            .field("is_protected", 36, Bool)
            .field("curr_frame", 37, FieldType::UInt64)
            .field("buffer_transform", 39, t("TransformProto"))
            .field("corner_radius", 41, Float)
            .map("metadata", 42, Int32, String)
            .field("effective_transform", 43, t("TransformProto"))
            .field("source_bounds", 44, t("FloatRectProto"))
            .field("bounds", 45, t("FloatRectProto"))
            .field("screen_bounds", 46, t("FloatRectProto"))
            .field("input_window_info", 47, t("InputWindowInfoProto"))
            .field("corner_radius_crop", 48, t("FloatRectProto"))
            .field("shadow_radius", 49, Float)
            .field("is_relative_of", 51, Bool)
            .field("background_blur_radius", 52, Int32)
            .field("owner_uid", 53, UInt32)
            .field("is_trusted_overlay", 55, Bool)
            .field("requested_corner_radius", 56, Float)
            .field("destination_frame", 57, t("RectProto"))
            .field("original_id", 58, UInt32),
    )
    .message(m("LayersProto").repeated("layers", 1, t("LayerProto")))
}

fn trace(file: FileBuilder) -> FileBuilder {
    use FieldType::{Bool, Fixed64, Int64, SFixed64, String, UInt32, UInt64};
    file.message(
        m("DisplayProto")
            .field("id", 1, UInt64)
            .field("name", 2, String)
            .field("layer_stack", 3, UInt32)
            .field("size", 4, t("SizeProto"))
            .field("layer_stack_space_rect", 5, t("RectProto"))
            .field("transform", 6, t("TransformProto"))
            .field("is_virtual", 7, Bool),
    )
    .message(
        m("LayersTraceProto")
            .field("elapsed_realtime_nanos", 1, SFixed64)
            .field("where", 2, String)
            .field("layers", 3, t("LayersProto"))
            .field("hwc_blob", 4, String)
            .field("excludes_composition_state", 5, Bool)
            .field("missed_entries", 6, UInt32)
            .repeated("displays", 7, t("DisplayProto"))
            .field("vsync_id", 8, Int64),
    )
    .message(
        m("LayersTraceFileProto")
            .field("magic_number", 1, Fixed64)
            .repeated("entry", 2, t("LayersTraceProto"))
            .field("real_to_elapsed_time_offset_nanos", 3, Fixed64),
    )
}

/// The layers trace schema as a single descriptor file.
pub fn schema_file() -> FileDescriptorProto {
    let file = FileBuilder::new("surfaceflinger/layerstrace.proto", PACKAGE);
    trace(layer(geometry(file))).build()
}

pub fn schema_options() -> SchemaOptions {
    SchemaOptions::default().with_annotation(TYPEDEF_OPTION, "typedef")
}

pub fn registry() -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::from_file_protos(vec![schema_file()], &schema_options())
}

/// `LayerFlags`, `InputConfig` and `WindowFlags` dictionaries.
pub fn intdefs() -> IntDefMap {
    IntDefMap::default()
        .with_dictionary(
            "LayerFlags",
            [
                (0x01, "HIDDEN"),
                (0x02, "OPAQUE"),
                (0x40, "SKIP_SCREENSHOT"),
                (0x80, "SECURE"),
                (0x100, "ENABLE_BACKPRESSURE"),
                (0x200, "DISPLAY_DECORATION"),
                (0x400, "IGNORE_DESTINATION_FRAME"),
            ],
        )
        .with_dictionary(
            "InputConfig",
            [
                (0x1, "NO_INPUT_CHANNEL"),
                (0x2, "NOT_VISIBLE"),
                (0x4, "NOT_FOCUSABLE"),
                (0x8, "NOT_TOUCHABLE"),
                (0x10, "PREVENT_SPLITTING"),
                (0x20, "DUPLICATE_TOUCH_TO_WALLPAPER"),
                (0x40, "IS_WALLPAPER"),
                (0x80, "PAUSE_DISPATCHING"),
                (0x100, "TRUSTED_OVERLAY"),
                (0x200, "WATCH_OUTSIDE_TOUCH"),
                (0x400, "SLIPPERY"),
                (0x800, "DISABLE_USER_ACTIVITY"),
                (0x1000, "DROP_INPUT"),
                (0x2000, "DROP_INPUT_IF_OBSCURED"),
                (0x4000, "SPY"),
                (0x8000, "INTERCEPTS_STYLUS"),
            ],
        )
        .with_dictionary(
            "WindowFlags",
            [
                (0x1, "FLAG_ALLOW_LOCK_WHILE_SCREEN_ON"),
                (0x2, "FLAG_DIM_BEHIND"),
                (0x4, "FLAG_BLUR_BEHIND"),
                (0x8, "FLAG_NOT_FOCUSABLE"),
                (0x10, "FLAG_NOT_TOUCHABLE"),
                (0x20, "FLAG_NOT_TOUCH_MODAL"),
                (0x40, "FLAG_TOUCHABLE_WHEN_WAKING"),
                (0x80, "FLAG_KEEP_SCREEN_ON"),
                (0x100, "FLAG_LAYOUT_IN_SCREEN"),
                (0x200, "FLAG_LAYOUT_NO_LIMITS"),
                (0x400, "FLAG_FULLSCREEN"),
                (0x800, "FLAG_FORCE_NOT_FULLSCREEN"),
                (0x1000, "FLAG_DITHER"),
                (0x2000, "FLAG_SECURE"),
                (0x4000, "FLAG_SCALED"),
                (0x8000, "FLAG_IGNORE_CHEEK_PRESSES"),
                (0x10000, "FLAG_LAYOUT_INSET_DECOR"),
                (0x20000, "FLAG_ALT_FOCUSABLE_IM"),
                (0x40000, "FLAG_WATCH_OUTSIDE_TOUCH"),
                (0x80000, "FLAG_SHOW_WHEN_LOCKED"),
                (0x100000, "FLAG_SHOW_WALLPAPER"),
                (0x200000, "FLAG_TURN_SCREEN_ON"),
                (0x400000, "FLAG_DISMISS_KEYGUARD"),
                (0x800000, "FLAG_SPLIT_TOUCH"),
                (0x1000000, "FLAG_HARDWARE_ACCELERATED"),
                (0x2000000, "FLAG_LAYOUT_IN_OVERSCAN"),
                (0x4000000, "FLAG_TRANSLUCENT_STATUS"),
                (0x8000000, "FLAG_TRANSLUCENT_NAVIGATION"),
                (0x10000000, "FLAG_LOCAL_FOCUS_MODE"),
                (0x20000000, "FLAG_SLIPPERY"),
                (0x40000000, "FLAG_LAYOUT_ATTACHED_IN_DECOR"),
                (0x80000000, "FLAG_DRAWS_SYSTEM_BAR_BACKGROUNDS"),
            ],
        )
        .with_binding(Some("InputWindowInfoProto"), "inputConfig", "InputConfig")
}

/// Layers listed flat under `layers.layers`, wired by `parent`.
pub fn format() -> TraceFormat {
    TraceFormat {
        name: "surface-flinger layers".into(),
        container: ContainerFormat {
            magic: MAGIC.to_vec(),
            entry_field: 2,
            timestamp_field: Some(1),
        },
        entry_message: ENTRY.into(),
        hierarchy: HierarchyFormat {
            root_kind: "LayerTraceEntry".into(),
            root_name: "root".into(),
            root_eager: FieldSelection::Except(vec!["layers".into(), "hwcBlob".into()]),
            children: ChildContainer::Flat {
                path: vec!["layers".into()],
                list: "layers".into(),
                parent_field: "parent".into(),
                children_field: Some("children".into()),
            },
            child_kind: "Layer".into(),
            child_message: LAYER.into(),
            id_field: Some("id".into()),
            name_field: "name".into(),
            eager: FieldSelection::Only(
                [
                    "id",
                    "name",
                    "parent",
                    "children",
                    "z",
                    "layerStack",
                    "flags",
                    "color",
                    "isOpaque",
                    "activeBuffer",
                    "visibleRegion",
                    "crop",
                    "transform",
                    "screenBounds",
                    "bounds",
                    "cornerRadius",
                    "shadowRadius",
                    "backgroundBlurRadius",
                    "zOrderRelativeOf",
                    "hwcCompositionType",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            ),
        },
        computations: vec![ComputationKind::Visibility, ComputationKind::LayerRects],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Value;

    #[test]
    fn registry_resolves_layer_fields() {
        let reg = registry().expect("registry");
        let layer = reg.fields_of(LAYER).expect("layer");
        assert_eq!(layer.field("parent").and_then(|f| f.default_value.clone()), Some(Value::Int(-1)));
        assert_eq!(layer.field("screenBounds").and_then(|f| f.message_type()), Some("android.surfaceflinger.FloatRectProto"));
        let input = reg.fields_of("android.surfaceflinger.InputWindowInfoProto").expect("input");
        assert_eq!(input.field("layoutParamsFlags").and_then(|f| f.annotation("typedef")), Some("WindowFlags"));
    }

    #[test]
    fn format_survives_json() {
        let json = serde_json::to_string(&format()).expect("encode");
        let back: TraceFormat = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, format());
    }

    #[test]
    fn eager_fields_exist_in_schema() {
        let reg = registry().expect("registry");
        let layer = reg.fields_of(LAYER).expect("layer");
        let FieldSelection::Only(names) = format().hierarchy.eager else {
            panic!("eager fields are an allow-list");
        };
        for name in names {
            assert!(layer.field(&name).is_some(), "{name}");
        }
    }
}
