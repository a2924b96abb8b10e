use serde_json::Value;

use siteaudit_pipeline::normalizer::normalize;
use siteaudit_pipeline::serializer::to_ndjson;
use siteaudit_pipeline::testing::sample_lhr;

fn golden() -> Value {
    serde_json::from_str(include_str!("fixtures/mock_parsed_lhr.json")).unwrap()
}

#[test]
fn mock_report_matches_golden_record() {
    let record = normalize(&sample_lhr(), "googlesearch").unwrap();
    assert_eq!(serde_json::to_value(&record).unwrap(), golden());
}

#[test]
fn golden_record_spot_checks() {
    let record = normalize(&sample_lhr(), "googlesearch").unwrap();

    assert_eq!(record.fetch_time, "2018-12-17T10:56:56.420Z");
    assert_eq!(record.site_url, "https://www.google.com/");
    assert_eq!(record.emulated_as.as_deref(), Some("mobile"));
    assert_eq!(record.blocked_urls, vec!["*.doubleclick.net", "*googletagmanager.com"]);
    assert_eq!(record.performance[0].total_score, Some(0.83));
    assert_eq!(record.performance[0].speed_index[0].raw_value, Some(2980.0));
    assert!(!record.seo[0].robots_txt_valid);
    assert_eq!(record.job_id, None);
}

#[test]
fn ndjson_line_parses_back_to_the_record() {
    let record = normalize(&sample_lhr(), "googlesearch").unwrap();
    let ndjson = to_ndjson(&[record.clone(), record]).unwrap();

    let lines: Vec<&str> = ndjson.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(ndjson.ends_with('\n'));
    let parsed: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed, golden());
}
