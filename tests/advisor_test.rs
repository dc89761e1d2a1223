use std::collections::BTreeMap;

use domainprobe::advisor::{advise, CategoryStatus, PerformanceFacts};
use domainprobe::classify::build_cdn_report;
use domainprobe::multi_location::{summarize, PingOutcome};

fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn fast_facts() -> PerformanceFacts {
    PerformanceFacts {
        response_time_ms: 50,
        dns_time_ms: 10,
        response_size: 10_000,
        status_code: 200,
    }
}

#[test]
fn test_best_case_scores_100_and_grades_a_plus() {
    // High-confidence CDN via headers, fast site, SSL present.
    let cdn = build_cdn_report(None, &headers(&[("cf-ray", "abc")]));
    let report = advise(&cdn, &fast_facts(), true);

    assert_eq!(report.cdn.status, CategoryStatus::Excellent);
    assert_eq!(report.ssl.status, CategoryStatus::Excellent);
    assert_eq!(report.overall.score, 100);
    assert_eq!(report.overall.grade, "A+");
    assert_eq!(report.overall.competitive_analysis.ranking, "leading");
    assert!(report.overall.action_plan.immediate.is_empty());
}

#[test]
fn test_missing_ssl_sets_critical_status_and_weighted_penalty() {
    // Direct connection (no CDN evidence), fast site, HTTP only.
    let cdn = build_cdn_report(None, &headers(&[("server", "nginx")]));
    let report = advise(&cdn, &fast_facts(), false);

    assert_eq!(report.ssl.status, CategoryStatus::Critical);
    // cdn critical (20) * 30% + performance (100) * 40% + ssl critical (20) * 30%
    assert_eq!(report.overall.score, 52);
    assert_eq!(report.overall.grade, "D");
    assert_eq!(report.overall.competitive_analysis.ranking, "behind");
    assert!(report
        .overall
        .action_plan
        .immediate
        .iter()
        .any(|a| a.contains("SSL certificate")));
}

#[test]
fn test_overall_score_is_always_in_range() {
    let cdn_variants = [
        build_cdn_report(None, &headers(&[("cf-ray", "a")])),
        build_cdn_report(None, &headers(&[("x-forwarded-for", "10.0.0.1")])),
        build_cdn_report(None, &headers(&[("server", "nginx")])),
    ];
    let facts_variants = [
        fast_facts(),
        PerformanceFacts {
            response_time_ms: 5000,
            dns_time_ms: 500,
            response_size: 5_000_000,
            status_code: 500,
        },
        PerformanceFacts {
            response_time_ms: 450,
            dns_time_ms: 80,
            response_size: 600_000,
            status_code: 301,
        },
    ];

    for cdn in &cdn_variants {
        for facts in &facts_variants {
            for has_ssl in [true, false] {
                let report = advise(cdn, facts, has_ssl);
                assert!(report.overall.score <= 100);
                assert!(!report.overall.grade.is_empty());
            }
        }
    }
}

#[test]
fn test_metric_driven_cdn_analysis_uses_composite_score() {
    // Six distinct IPs, no headers: metrics carry cdnScore 40, which lands
    // in the needs_improvement bracket of the metric-driven catalogue.
    let outcomes: Vec<PingOutcome> = (0..6)
        .map(|i| PingOutcome {
            location: format!("loc-{}", i),
            region: format!("region-{}", i),
            ip: format!("10.0.0.{}", i),
            time: 20,
            success: true,
            error: None,
        })
        .collect();
    let regions = (0..6).map(|i| format!("region-{}", i)).collect();
    let multi = summarize(outcomes, 6, 6, vec![], regions);
    let cdn = build_cdn_report(Some(&multi), &headers(&[]));

    let report = advise(&cdn, &fast_facts(), true);
    assert_eq!(report.cdn.status, CategoryStatus::NeedsImprovement);
    assert!(report.cdn.reasoning.contains("Composite CDN score 40"));
    assert!(report
        .overall
        .action_plan
        .short_term
        .iter()
        .any(|a| a.contains("CDN")));
}

#[test]
fn test_critical_categories_produce_immediate_actions() {
    let cdn = build_cdn_report(None, &headers(&[]));
    let slow = PerformanceFacts {
        response_time_ms: 3000,
        dns_time_ms: 200,
        response_size: 2_000_000,
        status_code: 500,
    };
    let report = advise(&cdn, &slow, false);

    assert_eq!(report.cdn.status, CategoryStatus::Critical);
    assert_eq!(report.performance.status, CategoryStatus::Critical);
    assert_eq!(report.ssl.status, CategoryStatus::Critical);
    assert_eq!(report.overall.action_plan.immediate.len(), 3);
    assert_eq!(report.overall.action_plan.long_term.len(), 3);
    assert!(report
        .overall
        .recommendations
        .iter()
        .any(|r| r.contains("needs immediate attention")));
}

#[test]
fn test_suggestion_levels_stay_within_tiers() {
    let cdn = build_cdn_report(None, &headers(&[("cf-ray", "a")]));
    let report = advise(&cdn, &fast_facts(), true);
    for category in [&report.cdn, &report.performance, &report.ssl] {
        assert!(!category.suggestions.is_empty());
        for suggestion in &category.suggestions {
            assert!((1..=5).contains(&suggestion.level));
            assert!(!suggestion.reasoning.is_empty());
        }
    }
}

#[test]
fn test_low_overall_score_adds_standing_recommendations() {
    let cdn = build_cdn_report(None, &headers(&[]));
    let report = advise(&cdn, &fast_facts(), false);
    assert!(report.overall.score < 70);
    assert!(report
        .overall
        .recommendations
        .iter()
        .any(|r| r.contains("needs significant improvement")));
}
