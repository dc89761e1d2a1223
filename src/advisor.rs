//! Optimization advisor.
//!
//! Maps classifier output plus performance/SSL facts into graded,
//! five-tier suggestions and an overall letter-graded score. Pure and
//! deterministic; all catalogues are static.

use serde::Serialize;

use crate::classify::{CdnReport, Confidence, ConnectionType};
use crate::config::{
    INDUSTRY_AVERAGE_SCORE, OVERALL_WEIGHT_CDN, OVERALL_WEIGHT_PERFORMANCE, OVERALL_WEIGHT_SSL,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryStatus {
    Excellent,
    Good,
    NeedsImprovement,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    pub text: String,
    /// 1 is most urgent, 5 is aspirational.
    pub level: u8,
    pub category: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAnalysis {
    pub status: CategoryStatus,
    pub suggestions: Vec<Suggestion>,
    pub reasoning: String,
    pub priority: Priority,
    pub estimated_improvement: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionPlan {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveAnalysis {
    pub ranking: String,
    pub industry_average: u32,
    pub improvement_potential: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallAnalysis {
    pub score: u32,
    pub grade: String,
    pub recommendations: Vec<String>,
    pub action_plan: ActionPlan,
    pub competitive_analysis: CompetitiveAnalysis,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub cdn: CategoryAnalysis,
    pub performance: CategoryAnalysis,
    pub ssl: CategoryAnalysis,
    pub overall: OverallAnalysis,
}

/// Facts the advisor consumes from the connection/DNS measurements.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceFacts {
    pub response_time_ms: u64,
    pub dns_time_ms: u64,
    pub response_size: u64,
    pub status_code: u16,
}

fn suggestion(text: &str, level: u8, category: &str, reasoning: &str) -> Suggestion {
    Suggestion {
        text: text.to_string(),
        level,
        category: category.to_string(),
        reasoning: reasoning.to_string(),
    }
}

fn status_points(status: CategoryStatus) -> u32 {
    match status {
        CategoryStatus::Excellent => 100,
        CategoryStatus::Good => 80,
        CategoryStatus::NeedsImprovement => 50,
        CategoryStatus::Critical => 20,
    }
}

/// Performance score: starts at 100 and is debited by fixed brackets.
pub fn performance_score(facts: &PerformanceFacts) -> i32 {
    let mut score: i32 = 100;

    score -= match facts.response_time_ms {
        t if t < 100 => 0,
        t if t < 200 => 10,
        t if t < 500 => 25,
        t if t < 1000 => 45,
        _ => 70,
    };

    if facts.dns_time_ms > 100 {
        score -= 15;
    } else if facts.dns_time_ms > 50 {
        score -= 5;
    }

    if facts.response_size > 1_000_000 {
        score -= 20;
    } else if facts.response_size > 500_000 {
        score -= 10;
    }

    if facts.status_code >= 400 {
        score -= 30;
    } else if facts.status_code >= 300 {
        score -= 10;
    }

    score
}

pub fn grade_for(score: u32) -> &'static str {
    if score >= 95 {
        "A+"
    } else if score >= 85 {
        "A"
    } else if score >= 70 {
        "B"
    } else if score >= 55 {
        "C"
    } else {
        "D"
    }
}

fn analyze_cdn(cdn: &CdnReport) -> CategoryAnalysis {
    if let Some(metrics) = &cdn.advanced_metrics {
        return analyze_cdn_by_metrics(metrics.cdn_score, &metrics.detection_methods);
    }
    analyze_cdn_legacy(cdn.connection_type, cdn.confidence)
}

fn analyze_cdn_by_metrics(cdn_score: u32, detection_methods: &[String]) -> CategoryAnalysis {
    let methods = detection_methods.join(" + ");
    if cdn_score >= 80 {
        CategoryAnalysis {
            status: CategoryStatus::Excellent,
            suggestions: vec![
                suggestion(
                    "CDN configuration is excellent; keep monitoring its performance",
                    4,
                    "cdn",
                    "Current CDN setup is already strong; ongoing monitoring preserves it",
                ),
                suggestion(
                    "Consider advanced CDN features: HTTP/3, QUIC, smart compression",
                    5,
                    "cdn",
                    "Forward-looking options that can add a competitive edge",
                ),
                suggestion(
                    "Tune cache rules to raise the cache hit ratio",
                    3,
                    "cdn",
                    "Worthwhile improvement with a further performance payoff",
                ),
                suggestion(
                    "Add edge compute to reduce origin fetches",
                    4,
                    "cdn",
                    "Potential gain; higher implementation cost but clear benefit",
                ),
            ],
            reasoning: format!(
                "Composite CDN score {} (detected via {}), configuration excellent",
                cdn_score, methods
            ),
            priority: Priority::Low,
            estimated_improvement: "5-10% performance gain".to_string(),
        }
    } else if cdn_score >= 60 {
        CategoryAnalysis {
            status: CategoryStatus::Good,
            suggestions: vec![
                suggestion(
                    "CDN configuration is good but leaves room to optimize",
                    3,
                    "cdn",
                    "Worthwhile improvement with a visible payoff",
                ),
                suggestion(
                    "Review cache rules and cache lifetimes",
                    3,
                    "cdn",
                    "Worthwhile improvement; tuning shows clear effect",
                ),
                suggestion(
                    "Consider additional CDN points of presence for wider coverage",
                    4,
                    "cdn",
                    "Potential gain; needs a cost-benefit check",
                ),
                suggestion(
                    "Enable image optimization and automatic compression",
                    3,
                    "cdn",
                    "Worthwhile improvement that is simple to roll out",
                ),
            ],
            reasoning: format!(
                "Composite CDN score {}, good configuration with further headroom",
                cdn_score
            ),
            priority: Priority::Medium,
            estimated_improvement: "15-25% performance gain".to_string(),
        }
    } else if cdn_score >= 30 {
        CategoryAnalysis {
            status: CategoryStatus::NeedsImprovement,
            suggestions: vec![
                suggestion(
                    "CDN configuration needs work; review the setup end to end",
                    2,
                    "cdn",
                    "High-priority fix; the current state hurts performance",
                ),
                suggestion(
                    "Confirm DNS records point at the CDN",
                    2,
                    "cdn",
                    "High-priority fix; a misconfiguration can disable the CDN entirely",
                ),
                suggestion(
                    "Tune cache configuration and set sensible lifetimes",
                    3,
                    "cdn",
                    "Worthwhile improvement with a clear payoff",
                ),
                suggestion(
                    "Consider upgrading to a higher CDN service tier",
                    4,
                    "cdn",
                    "Potential gain; requires an investment decision",
                ),
            ],
            reasoning: format!(
                "Composite CDN score {}, configuration shows clear problems",
                cdn_score
            ),
            priority: Priority::High,
            estimated_improvement: "30-50% performance gain".to_string(),
        }
    } else {
        CategoryAnalysis {
            status: CategoryStatus::Critical,
            suggestions: vec![
                suggestion(
                    "No working CDN detected; configure one as soon as possible",
                    1,
                    "cdn",
                    "Urgent fix; the absence of a CDN hurts users and performance",
                ),
                suggestion(
                    "Consider a mainstream CDN service such as Cloudflare, CloudFront or Fastly",
                    1,
                    "cdn",
                    "Urgent fix; basic CDN coverage is missing",
                ),
                suggestion(
                    "Set up global CDN acceleration covering your main user regions",
                    2,
                    "cdn",
                    "High-priority fix; affects users everywhere",
                ),
                suggestion(
                    "Define sensible cache and compression policies",
                    2,
                    "cdn",
                    "High-priority fix; baseline configuration is absent",
                ),
            ],
            reasoning: format!(
                "Composite CDN score {}, no effective CDN acceleration in use",
                cdn_score
            ),
            priority: Priority::High,
            estimated_improvement: "50-80% performance gain".to_string(),
        }
    }
}

/// Header-only fallback used when no multi-metric scoring was available.
fn analyze_cdn_legacy(connection_type: ConnectionType, confidence: Confidence) -> CategoryAnalysis {
    if connection_type == ConnectionType::Cdn && confidence == Confidence::High {
        CategoryAnalysis {
            status: CategoryStatus::Excellent,
            suggestions: vec![
                suggestion(
                    "CDN is configured well; keep monitoring its performance",
                    4,
                    "cdn",
                    "Potential gain; current configuration is already good",
                ),
                suggestion(
                    "Consider advanced CDN features such as cache tuning and compression",
                    5,
                    "cdn",
                    "Forward-looking option with a technical edge",
                ),
                suggestion(
                    "Review CDN coverage and edge health periodically",
                    3,
                    "cdn",
                    "Worthwhile improvement for stability",
                ),
            ],
            reasoning: "CDN detected with high confidence; delivery is well optimized".to_string(),
            priority: Priority::Low,
            estimated_improvement: "5-15% performance gain".to_string(),
        }
    } else if connection_type == ConnectionType::Cdn {
        CategoryAnalysis {
            status: CategoryStatus::Good,
            suggestions: vec![
                suggestion(
                    "CDN is enabled but its configuration may need tuning",
                    3,
                    "cdn",
                    "Worthwhile improvement; optimization headroom exists",
                ),
                suggestion(
                    "Check CDN cache rules and hit ratio",
                    3,
                    "cdn",
                    "Worthwhile improvement with a performance payoff",
                ),
                suggestion(
                    "Consider additional CDN points of presence",
                    4,
                    "cdn",
                    "Potential gain; needs an investment decision",
                ),
            ],
            reasoning: "CDN detected with medium confidence; configuration deserves a review"
                .to_string(),
            priority: Priority::Medium,
            estimated_improvement: "15-30% performance gain".to_string(),
        }
    } else if connection_type == ConnectionType::Mixed {
        CategoryAnalysis {
            status: CategoryStatus::NeedsImprovement,
            suggestions: vec![
                suggestion(
                    "Possible partial CDN detected; confirm and complete the setup",
                    2,
                    "cdn",
                    "High-priority fix; an incomplete setup blunts the benefit",
                ),
                suggestion(
                    "Check that DNS records point at the CDN",
                    2,
                    "cdn",
                    "High-priority fix; DNS misconfiguration suspected",
                ),
                suggestion(
                    "Consider a global CDN to improve access speed",
                    3,
                    "cdn",
                    "Worthwhile improvement with a clear payoff",
                ),
            ],
            reasoning: "Connection type is mixed; the CDN setup may be incomplete".to_string(),
            priority: Priority::High,
            estimated_improvement: "25-45% performance gain".to_string(),
        }
    } else {
        CategoryAnalysis {
            status: CategoryStatus::Critical,
            suggestions: vec![
                suggestion(
                    "No CDN in use; configure one to improve access speed",
                    1,
                    "cdn",
                    "Urgent fix; hurts users and performance",
                ),
                suggestion(
                    "Consider Cloudflare, CloudFront, Fastly or a comparable service",
                    1,
                    "cdn",
                    "Urgent fix; basic CDN coverage is missing",
                ),
                suggestion(
                    "A CDN cuts latency significantly and improves user experience",
                    2,
                    "cdn",
                    "High-priority fix; baseline infrastructure is absent",
                ),
            ],
            reasoning: "No CDN detected; delivery performance has significant headroom".to_string(),
            priority: Priority::High,
            estimated_improvement: "40-70% performance gain".to_string(),
        }
    }
}

fn analyze_performance(facts: &PerformanceFacts) -> CategoryAnalysis {
    let score = performance_score(facts);
    let response_time = facts.response_time_ms;

    let mut analysis = if score >= 85 {
        CategoryAnalysis {
            status: CategoryStatus::Excellent,
            suggestions: vec![
                suggestion(
                    "Response times are excellent; keep the current configuration",
                    4,
                    "performance",
                    "Potential gain only; performance is already excellent",
                ),
                suggestion(
                    "Monitor performance metrics regularly to catch regressions",
                    3,
                    "performance",
                    "Worthwhile improvement; prevents silent degradation",
                ),
                suggestion(
                    "Consider HTTP/2 and Brotli compression if not already enabled",
                    5,
                    "performance",
                    "Forward-looking option using current standards",
                ),
                suggestion(
                    "Adopt a performance budget to guard against regressions",
                    4,
                    "performance",
                    "Potential gain; long-term performance governance",
                ),
            ],
            reasoning: format!(
                "Composite performance score {}, response time {}ms, excellent",
                score, response_time
            ),
            priority: Priority::Low,
            estimated_improvement: "5-10% performance gain".to_string(),
        }
    } else if score >= 70 {
        CategoryAnalysis {
            status: CategoryStatus::Good,
            suggestions: vec![
                suggestion(
                    "Performance is good with room to improve further",
                    3,
                    "performance",
                    "Worthwhile improvement; headroom exists",
                ),
                suggestion(
                    "Review database queries and API calls for hot spots",
                    3,
                    "performance",
                    "Worthwhile improvement; speeds up responses",
                ),
                suggestion(
                    "Apply browser caching and server-side caching",
                    3,
                    "performance",
                    "Worthwhile improvement; avoids repeated work",
                ),
                suggestion(
                    "Consider resource preloading and preconnect hints",
                    4,
                    "performance",
                    "Potential gain for perceived latency",
                ),
            ],
            reasoning: format!(
                "Composite performance score {}, response time {}ms, good",
                score, response_time
            ),
            priority: Priority::Medium,
            estimated_improvement: "10-20% performance gain".to_string(),
        }
    } else if score >= 50 {
        CategoryAnalysis {
            status: CategoryStatus::NeedsImprovement,
            suggestions: vec![
                suggestion(
                    "Performance needs attention; act on the items below",
                    2,
                    "performance",
                    "High-priority fix; user experience is affected",
                ),
                suggestion(
                    "Optimize images: serve WebP and responsive sizes",
                    2,
                    "performance",
                    "High-priority fix; large cut in page weight",
                ),
                suggestion(
                    "Enable gzip or Brotli compression on responses",
                    2,
                    "performance",
                    "High-priority fix; cheap transfer savings",
                ),
                suggestion(
                    "Use a CDN for static assets",
                    3,
                    "performance",
                    "Worthwhile improvement; big load-time win",
                ),
                suggestion(
                    "Remove render-blocking JavaScript and CSS",
                    3,
                    "performance",
                    "Worthwhile improvement for paint times",
                ),
            ],
            reasoning: format!(
                "Composite performance score {}, response time {}ms, needs optimization",
                score, response_time
            ),
            priority: Priority::High,
            estimated_improvement: "25-40% performance gain".to_string(),
        }
    } else {
        CategoryAnalysis {
            status: CategoryStatus::Critical,
            suggestions: vec![
                suggestion(
                    "Performance is severely degraded; a full optimization pass is needed",
                    1,
                    "performance",
                    "Urgent fix; user experience and SEO both suffer",
                ),
                suggestion(
                    "Inspect server configuration and resource loading immediately",
                    1,
                    "performance",
                    "Urgent fix; a configuration error is likely",
                ),
                suggestion(
                    "Optimize database queries and add caching layers",
                    1,
                    "performance",
                    "Urgent fix; backend bottleneck suspected",
                ),
                suggestion(
                    "Compress and split static assets",
                    2,
                    "performance",
                    "High-priority fix; necessary frontend work",
                ),
                suggestion(
                    "Adopt CDN acceleration and modern web delivery",
                    2,
                    "performance",
                    "High-priority fix; infrastructure upgrade",
                ),
            ],
            reasoning: format!(
                "Composite performance score {}, response time {}ms, severely degraded",
                score, response_time
            ),
            priority: Priority::High,
            estimated_improvement: "40-70% performance gain".to_string(),
        }
    };

    if facts.dns_time_ms > 100 {
        analysis.suggestions.push(suggestion(
            "DNS resolution is slow; consider a faster DNS provider",
            2,
            "performance",
            "High-priority fix; slow DNS delays every request",
        ));
        analysis.suggestions.push(suggestion(
            "Use dns-prefetch and preconnect hints",
            3,
            "performance",
            "Worthwhile improvement; hides DNS latency",
        ));
    }

    if facts.response_size > 1_000_000 {
        analysis.suggestions.push(suggestion(
            "The response body is large; reduce asset sizes",
            2,
            "performance",
            "High-priority fix; size slows every load",
        ));
        analysis.suggestions.push(suggestion(
            "Compress responses and lazy-load below-the-fold assets",
            3,
            "performance",
            "Worthwhile improvement for transfer efficiency",
        ));
    }

    analysis
}

fn analyze_ssl(has_ssl: bool) -> CategoryAnalysis {
    if has_ssl {
        CategoryAnalysis {
            status: CategoryStatus::Excellent,
            suggestions: vec![
                suggestion(
                    "SSL is configured; transport is protected",
                    4,
                    "ssl",
                    "Potential gain only; current configuration is good",
                ),
                suggestion(
                    "Track certificate expiry to avoid outages",
                    3,
                    "ssl",
                    "Worthwhile improvement; prevents downtime",
                ),
                suggestion(
                    "Consider enabling HSTS",
                    4,
                    "ssl",
                    "Potential gain; raises the security bar",
                ),
                suggestion(
                    "Review cipher configuration for modern algorithms",
                    4,
                    "ssl",
                    "Potential gain; stays current",
                ),
                suggestion(
                    "Automate certificate renewal and monitoring",
                    3,
                    "ssl",
                    "Worthwhile improvement; removes manual toil",
                ),
            ],
            reasoning: "SSL certificate present; security posture is good and helps SEO and trust"
                .to_string(),
            priority: Priority::Low,
            estimated_improvement: "Security and SEO gains".to_string(),
        }
    } else {
        CategoryAnalysis {
            status: CategoryStatus::Critical,
            suggestions: vec![
                suggestion(
                    "No SSL certificate; transport security is at serious risk",
                    1,
                    "ssl",
                    "Urgent fix; traffic is unencrypted",
                ),
                suggestion(
                    "Obtain and install a certificate (Let's Encrypt issues them for free)",
                    1,
                    "ssl",
                    "Urgent fix; baseline security measure is missing",
                ),
                suggestion(
                    "Serve all traffic over HTTPS",
                    1,
                    "ssl",
                    "Urgent fix; protects user data",
                ),
                suggestion(
                    "Search engines favor HTTPS sites in ranking",
                    2,
                    "ssl",
                    "High-priority fix; affects search placement",
                ),
                suggestion(
                    "Modern browsers flag HTTP sites as not secure",
                    2,
                    "ssl",
                    "High-priority fix; erodes user trust",
                ),
            ],
            reasoning: "No SSL detected; security needs urgent attention".to_string(),
            priority: Priority::High,
            estimated_improvement: "Significantly improves security and SEO ranking".to_string(),
        }
    }
}

/// Produce the full optimization report.
pub fn advise(cdn: &CdnReport, facts: &PerformanceFacts, has_ssl: bool) -> OptimizationReport {
    let cdn_analysis = analyze_cdn(cdn);
    let performance_analysis = analyze_performance(facts);
    let ssl_analysis = analyze_ssl(has_ssl);

    let cdn_points = status_points(cdn_analysis.status);
    // Performance blends its raw score, floored at 20.
    let perf_points = performance_score(facts).max(20) as u32;
    let ssl_points = status_points(ssl_analysis.status);

    let overall_score = ((cdn_points * OVERALL_WEIGHT_CDN
        + perf_points * OVERALL_WEIGHT_PERFORMANCE
        + ssl_points * OVERALL_WEIGHT_SSL) as f64
        / 100.0)
        .round() as u32;

    let mut action_plan = ActionPlan {
        immediate: Vec::new(),
        short_term: Vec::new(),
        long_term: vec![
            "Establish a performance monitoring practice".to_string(),
            "Run periodic performance audits".to_string(),
            "Continuously improve user experience".to_string(),
        ],
    };
    if ssl_analysis.status == CategoryStatus::Critical {
        action_plan
            .immediate
            .push("Install an SSL certificate and enable HTTPS".to_string());
    }
    if performance_analysis.status == CategoryStatus::Critical {
        action_plan
            .immediate
            .push("Optimize site performance and reduce response time".to_string());
    }
    if cdn_analysis.status == CategoryStatus::Critical {
        action_plan
            .immediate
            .push("Set up CDN acceleration".to_string());
    }
    if performance_analysis.status == CategoryStatus::NeedsImprovement {
        action_plan
            .short_term
            .push("Continue optimizing site performance".to_string());
    }
    if cdn_analysis.status == CategoryStatus::NeedsImprovement {
        action_plan
            .short_term
            .push("Tune the CDN configuration".to_string());
    }

    let mut recommendations = Vec::new();
    if overall_score < 70 {
        recommendations.push(
            "Overall performance needs significant improvement; prioritize the critical items"
                .to_string(),
        );
        recommendations
            .push("Draw up a concrete optimization plan and timeline".to_string());
    }
    let mut categories = [
        (ssl_points, "Security", ssl_analysis.status == CategoryStatus::Critical),
        (perf_points, "Performance", performance_analysis.status == CategoryStatus::Critical),
        (cdn_points, "CDN", cdn_analysis.status == CategoryStatus::Critical),
    ];
    categories.sort_by_key(|(points, _, _)| *points);
    for (index, (points, name, critical)) in categories.iter().enumerate() {
        if *critical {
            recommendations.push(format!("{} configuration needs immediate attention", name));
        } else if *points < 80 && index < 2 {
            recommendations.push(format!(
                "{} optimization is the key lever for overall improvement",
                name
            ));
        }
    }

    let ranking = if overall_score >= 85 {
        "leading"
    } else if overall_score >= 70 {
        "good"
    } else if overall_score >= 55 {
        "average"
    } else {
        "behind"
    };
    let improvement_potential = if overall_score >= 85 {
        "5-10%"
    } else if overall_score >= 70 {
        "10-20%"
    } else if overall_score >= 55 {
        "20-40%"
    } else {
        "40-60%"
    };

    OptimizationReport {
        cdn: cdn_analysis,
        performance: performance_analysis,
        ssl: ssl_analysis,
        overall: OverallAnalysis {
            score: overall_score,
            grade: grade_for(overall_score).to_string(),
            recommendations,
            action_plan,
            competitive_analysis: CompetitiveAnalysis {
                ranking: ranking.to_string(),
                industry_average: INDUSTRY_AVERAGE_SCORE,
                improvement_potential: improvement_potential.to_string(),
            },
        },
    }
}
