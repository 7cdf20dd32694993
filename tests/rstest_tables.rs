//! Table-driven cases for host normalization and the cluster scoring
//! formula, run independently of any database.

use climate_river::models::article::normalize_host;
use climate_river::models::cluster::compute_score;
use rstest::rstest;

#[rstest]
#[case("example.com", "example.com")]
#[case("www.example.com", "example.com")]
#[case("amp.example.com", "example.com")]
#[case("m.news.example.com", "example.com")]
#[case("Edition.CNN.com", "cnn.com")]
#[case("beta.www.amp.example.com", "example.com")]
#[case("no-prefix-here.org", "no-prefix-here.org")]
fn normalize_host_strips_known_prefixes(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(normalize_host(input), expected);
}

#[rstest]
#[case(3, 1.0, 1.4)]
#[case(5, 48.0, -16.2)]
#[case(1, 0.0, 0.6)]
#[case(0, 0.0, 0.0)]
#[case(10, 24.0, -3.6)]
fn compute_score_matches_formula(#[case] size: i32, #[case] delta_hours: f64, #[case] expected: f64) {
    let score = compute_score(size, delta_hours);
    assert!((score - expected).abs() < 1e-9, "expected {expected}, got {score}");
}
