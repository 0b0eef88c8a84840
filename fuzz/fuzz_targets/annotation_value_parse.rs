#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_pipeline_notify::identity_store::{
    annotation_key, read_annotation, AnnotationSlot, MessageKind, SLACK_ANNOTATION_PREFIX,
};
use tau_pipeline_notify::{MessageReference, PipelineActivity};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Some(reference) = MessageReference::parse_annotation_value(&raw) {
        assert!(!reference.channel_id.is_empty());
        assert!(!reference.timestamp.is_empty());
        assert!(!reference.channel_id.contains('/'));
        assert_eq!(reference.to_annotation_value(), raw);
    }

    let key = annotation_key(SLACK_ANNOTATION_PREFIX, "#builds", MessageKind::PullRequestReview);
    let mut activity = PipelineActivity {
        name: "fuzz".to_string(),
        ..PipelineActivity::default()
    };
    activity.annotations.insert(key.clone(), raw.to_string());
    match read_annotation(&activity, &key) {
        AnnotationSlot::Absent => assert!(raw.is_empty()),
        AnnotationSlot::Present(reference) => {
            assert_eq!(reference.to_annotation_value(), raw);
        }
        AnnotationSlot::Malformed(value) => assert_eq!(value, raw),
    }
});
