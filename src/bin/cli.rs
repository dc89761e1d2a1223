//! domainprobe-cli: drives the /test-domain endpoint repeatedly and prints
//! per-run reports plus an aggregate summary. Pure consumer of the service's
//! JSON contract; no probing logic of its own.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_json::Value;

/// Repeatedly test a domain through a running domainprobe server.
#[derive(Parser, Debug)]
#[command(name = "domainprobe-cli")]
struct CliArgs {
    /// Domain to test
    #[arg(short = 'd', long = "domain")]
    domain: String,

    /// Number of test runs
    #[arg(short = 'c', long = "count", default_value_t = 5)]
    count: u32,

    /// Pause between runs, in milliseconds
    #[arg(short = 'i', long = "interval-ms", default_value_t = 1000)]
    interval_ms: u64,

    /// Base URL of the test-domain endpoint
    #[arg(long = "api-url", default_value = "http://localhost:3000/test-domain")]
    api_url: String,
}

struct RunRecord {
    total_time: u64,
    connection_type: String,
    grade: String,
    score: u64,
    has_ssl: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    println!(
        "Testing {} ({} runs, {}ms interval)\n",
        args.domain, args.count, args.interval_ms
    );

    let mut records: Vec<RunRecord> = Vec::new();
    let mut failures = 0u32;

    for run in 1..=args.count {
        let started = Instant::now();
        match fetch_report(&client, &args.api_url, &args.domain).await {
            Ok(report) => {
                print_run(run, started.elapsed(), &report);
                records.push(report);
            }
            Err(e) => {
                failures += 1;
                println!("=== Run {}: request failed: {} ===", run, e);
            }
        }
        if run < args.count {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    print_summary(&records, failures);
    Ok(())
}

async fn fetch_report(
    client: &reqwest::Client,
    api_url: &str,
    domain: &str,
) -> anyhow::Result<RunRecord> {
    let response = client
        .get(api_url)
        .query(&[("domain", domain)])
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {}: {}", status, response.text().await.unwrap_or_default());
    }
    let body: Value = response.json().await?;
    let results = &body["testResults"];

    if let Some(error) = results["connection"]["error"].as_str() {
        anyhow::bail!("test reported a connection failure: {}", error);
    }

    Ok(RunRecord {
        total_time: results["connection"]["totalTime"].as_u64().unwrap_or(0),
        connection_type: results["cdn"]["connectionType"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        grade: results["optimization"]["overall"]["grade"]
            .as_str()
            .unwrap_or("-")
            .to_string(),
        score: results["optimization"]["overall"]["score"]
            .as_u64()
            .unwrap_or(0),
        has_ssl: results.get("ssl").is_some(),
    })
}

fn print_run(run: u32, api_elapsed: Duration, record: &RunRecord) {
    println!(
        "=== Run {}: {}ms total, {} connection, grade {} (score {}), ssl: {} (api {}ms) ===",
        run,
        record.total_time,
        record.connection_type,
        record.grade,
        record.score,
        if record.has_ssl { "yes" } else { "no" },
        api_elapsed.as_millis()
    );
}

fn print_summary(records: &[RunRecord], failures: u32) {
    println!("\n{:-<60}", "");
    println!("Summary");
    println!("{:-<60}", "");

    if records.is_empty() {
        println!("No successful runs ({} failed)", failures);
        return;
    }

    let times: Vec<u64> = records.iter().map(|r| r.total_time).collect();
    let avg = times.iter().sum::<u64>() as f64 / times.len() as f64;
    let min = times.iter().min().copied().unwrap_or(0);
    let max = times.iter().max().copied().unwrap_or(0);

    let mut type_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *type_counts.entry(record.connection_type.as_str()).or_default() += 1;
    }
    let ssl_count = records.iter().filter(|r| r.has_ssl).count();

    println!("Runs:            {} ok, {} failed", records.len(), failures);
    println!("Total time:      avg {:.1}ms, min {}ms, max {}ms", avg, min, max);
    print!("Connection type:");
    for (kind, count) in &type_counts {
        print!(" {} x{}", kind, count);
    }
    println!();
    println!(
        "SSL adoption:    {:.0}% ({} of {})",
        ssl_count as f64 / records.len() as f64 * 100.0,
        ssl_count,
        records.len()
    );
}
