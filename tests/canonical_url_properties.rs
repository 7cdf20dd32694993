//! Canonical-URL normalization idempotence: re-canonicalizing an already
//! canonical URL is a no-op, for any URL the generator can produce.

use climate_river::models::article::canonicalize_url;
use proptest::prelude::*;

fn arb_host() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("example.com".to_string()),
        Just("www.example.com".to_string()),
        Just("amp.example.com".to_string()),
        Just("m.news.example.com".to_string()),
        Just("Example.COM".to_string()),
    ]
}

fn arb_path_segment() -> impl Strategy<Value = String> {
    "[a-z0-9-]{1,12}"
}

fn arb_tracking_param() -> impl Strategy<Value = (String, String)> {
    prop_oneof![
        Just("utm_source".to_string()),
        Just("utm_campaign".to_string()),
        Just("fbclid".to_string()),
        Just("gclid".to_string()),
    ]
    .prop_flat_map(|key| ("[a-zA-Z0-9]{1,8}").prop_map(move |v| (key.clone(), v)))
}

proptest! {
    #[test]
    fn canonicalization_is_idempotent(
        host in arb_host(),
        path in arb_path_segment(),
        tracking in proptest::option::of(arb_tracking_param()),
    ) {
        let query = tracking
            .map(|(k, v)| format!("?{k}={v}"))
            .unwrap_or_default();
        let raw = format!("https://{host}/{path}{query}");

        let Some(once) = canonicalize_url(&raw) else {
            return Ok(());
        };
        let twice = canonicalize_url(&once);

        prop_assert_eq!(Some(once), twice);
    }

    #[test]
    fn canonicalization_strips_all_tracking_prefixes(
        host in arb_host(),
        path in arb_path_segment(),
    ) {
        let raw = format!(
            "https://{host}/{path}?utm_source=newsletter&utm_campaign=spring&id=42"
        );
        let canonical = canonicalize_url(&raw);
        prop_assert!(canonical.is_some());
        let canonical = canonical.unwrap();
        prop_assert!(!canonical.contains("utm_"));
        prop_assert!(canonical.contains("id=42"));
    }
}

#[test]
fn dedup_example_from_worked_scenario() {
    let a = canonicalize_url("HTTPS://WWW.Example.com/x?utm_source=a").unwrap();
    let b = canonicalize_url("https://example.com/x").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "https://example.com/x");
}
