#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_pipeline_notify::activity::parse_git_url;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    if let Some(repo) = parse_git_url(&raw) {
        assert!(!repo.owner.is_empty());
        assert!(!repo.name.is_empty());
        assert!(!repo.name.contains('/'));
        assert!(repo.full_name().ends_with(&repo.name));
    }
});
