use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use dogwrangle::app::ports::{HttpClientPort, HttpGetResult};
use dogwrangle::config::Config;
use dogwrangle::error::WrangleError;
use dogwrangle::pipeline::processing::clean::{CleaningPipeline, RatingCorrections};
use dogwrangle::pipeline::processing::quality_gate::QualityIssueType;
use dogwrangle::pipeline::Pipeline;

const PREDICTIONS_URL: &str = "https://example.com/image-predictions.tsv";

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn corrections_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("config")
        .join("rating_corrections.toml")
}

fn config_for(dir: &Path, archive: &Path) -> Config {
    let toml = format!(
        r#"
[sources]
archive = "{archive}"
predictions_url = "{url}"
predictions_cache = "{cache}"
engagement = "{engagement}"

[http]
timeout_seconds = 5

[cleaning]
corrections = "{corrections}"

[output]
merged = "{merged}"
report_dir = "{report}"
"#,
        archive = archive.display(),
        url = PREDICTIONS_URL,
        cache = dir.join("cache").join("image_predictions.tsv").display(),
        engagement = fixture("tweet_json.txt").display(),
        corrections = corrections_path().display(),
        merged = dir.join("output").join("master_df.csv").display(),
        report = dir.join("output").join("report").display(),
    );
    Config::from_toml_str(&toml).unwrap()
}

/// Serves a predictions file and counts requests.
struct FixtureHttp {
    calls: Arc<AtomicUsize>,
    body: Vec<u8>,
}

impl FixtureHttp {
    fn new(calls: Arc<AtomicUsize>) -> Self {
        let body = fs::read(fixture("image-predictions.tsv")).unwrap();
        Self::serving(calls, body)
    }

    fn serving(calls: Arc<AtomicUsize>, body: Vec<u8>) -> Self {
        Self { calls, body }
    }
}

#[async_trait]
impl HttpClientPort for FixtureHttp {
    async fn get(&self, url: &str) -> std::result::Result<HttpGetResult, String> {
        assert_eq!(url, PREDICTIONS_URL);
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self.body.clone();
        Ok(HttpGetResult {
            status: 200,
            content_length: bytes.len() as u64,
            bytes,
            content_type: "text/tab-separated-values".to_string(),
        })
    }
}

struct UnreachableHttp;

#[async_trait]
impl HttpClientPort for UnreachableHttp {
    async fn get(&self, _url: &str) -> std::result::Result<HttpGetResult, String> {
        Err("operation timed out".to_string())
    }
}

fn pipeline(dir: &TempDir) -> (Pipeline, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let http = FixtureHttp::new(calls.clone());
    let config = config_for(dir.path(), &fixture("twitter-archive-enhanced.csv"));
    (Pipeline::new(config, Box::new(http)), calls)
}

/// Rows of the merged CSV keyed by id, plus the header.
fn read_master(path: &Path) -> Result<(Vec<String>, HashMap<String, HashMap<String, String>>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let row: HashMap<String, String> = header
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.insert(row["id"].clone(), row);
    }
    Ok((header, rows))
}

#[tokio::test]
async fn full_run_produces_clean_merged_table() -> Result<()> {
    let dir = tempdir()?;
    let (pipeline, calls) = pipeline(&dir);
    let result = pipeline.run().await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.archive_rows, 15);
    assert_eq!(result.prediction_rows, 14);
    assert_eq!(result.skipped_engagement_lines, 2);
    assert_eq!(result.merged_rows, 11);
    assert!(dir.path().join("cache").join("image_predictions.tsv").exists());

    let (header, rows) = read_master(&result.output.path)?;
    assert_eq!(rows.len(), 11);
    for dropped in [
        "retweeted_status_id",
        "retweeted_status_user_id",
        "retweeted_status_timestamp",
        "doggo",
        "floofer",
        "pupper",
        "puppo",
    ] {
        assert!(!header.iter().any(|h| h == dropped), "{} still present", dropped);
    }
    for kept in ["dog_stage", "favorite_count", "retweet_count", "jpg_url", "p1_conf"] {
        assert!(header.iter().any(|h| h == kept), "{} missing", kept);
    }

    let stages = ["", "doggo", "floofer", "pupper", "puppo"];
    for (id, row) in &rows {
        assert!(id.bytes().all(|b| b.is_ascii_digit()), "id {}", id);
        assert!(!row["expanded_urls"].trim().is_empty());
        row["favorite_count"].parse::<u64>()?;
        row["retweet_count"].parse::<u64>()?;
        assert!(row["dog_stage"]
            .split(", ")
            .all(|stage| stages.contains(&stage)));
        let name = &row["name"];
        assert!(name.is_empty() || name.chars().any(char::is_uppercase), "{}", name);
        assert!(matches!(
            row["source"].as_str(),
            "Twitter for iPhone" | "Twitter Web Client"
        ));
    }

    // gone: repost, reply without media, lowercase name, no prediction
    for id in [
        "886054160059072513",
        "886267009285017600",
        "887517139158093824",
        "890971913173991426",
    ] {
        assert!(!rows.contains_key(id), "{} should have been removed", id);
    }

    let phineas = &rows["892420643555336193"];
    assert_eq!(phineas["timestamp"], "2017-08-01 16:23:56+00:00");
    assert_eq!(phineas["favorite_count"], "39467");
    assert_eq!(rows["892177421306343426"]["favorite_count"], "0");

    assert_eq!(rows["680494726643068929"]["rating_numerator"], "11.26");
    assert_eq!(rows["786709082849828864"]["rating_numerator"], "9.75");
    assert_eq!(rows["883482846933004288"]["rating_numerator"], "13.5");
    assert_eq!(rows["883482846933004288"]["favorite_count"], "46860");
    assert_eq!(rows["778027034220126208"]["rating_numerator"], "11.27");
    assert_eq!(rows["778027034220126208"]["dog_stage"], "pupper");
    assert_eq!(rows["810984652412424192"]["rating_numerator"], "");
    assert_eq!(rows["810984652412424192"]["rating_denominator"], "");
    let fixed = &rows["666287406224695296"];
    assert_eq!(fixed["rating_numerator"].parse::<f64>()?, 9.0);
    assert_eq!(fixed["rating_denominator"].parse::<f64>()?, 10.0);

    assert_eq!(rows["817777686764523521"]["dog_stage"], "doggo, pupper");
    assert_eq!(rows["854010172552949760"]["dog_stage"], "doggo, floofer");
    assert_eq!(rows["889665388333682689"]["dog_stage"], "puppo");
    assert_eq!(phineas["dog_stage"], "");

    assert_eq!(result.report.unstaged, 7);
    assert!(result.artifacts.summary.exists());
    for chart in &result.artifacts.charts {
        assert!(chart.exists());
    }
    Ok(())
}

#[tokio::test]
async fn rerun_is_byte_identical() -> Result<()> {
    let dir = tempdir()?;
    let (first, _) = pipeline(&dir);
    let first = first.run().await?;
    let bytes = fs::read(&first.output.path)?;

    let (second, _) = pipeline(&dir);
    let second = second.run().await?;

    assert_eq!(first.output.sha256, second.output.sha256);
    assert_eq!(bytes, fs::read(&second.output.path)?);
    Ok(())
}

#[tokio::test]
async fn cached_predictions_skip_the_download() -> Result<()> {
    let dir = tempdir()?;
    let (first, calls) = pipeline(&dir);
    first.run().await?;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (second, second_calls) = pipeline(&dir);
    let result = second.use_cache(true).run().await?;
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.merged_rows, 11);
    Ok(())
}

#[tokio::test]
async fn failed_fetch_writes_no_output() -> Result<()> {
    let dir = tempdir()?;
    let config = config_for(dir.path(), &fixture("twitter-archive-enhanced.csv"));
    let merged = config.output.merged.clone();

    let err = Pipeline::new(config, Box::new(UnreachableHttp))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, WrangleError::Network { .. }));
    assert!(!merged.exists());
    Ok(())
}

#[tokio::test]
async fn bad_timestamp_aborts_before_persisting() -> Result<()> {
    let dir = tempdir()?;
    let original = fs::read_to_string(fixture("twitter-archive-enhanced.csv"))?;
    let broken_archive = dir.path().join("archive.csv");
    fs::write(
        &broken_archive,
        original.replace("2017-08-01 16:23:56 +0000", "sometime in August"),
    )?;

    let config = config_for(dir.path(), &broken_archive);
    let merged = config.output.merged.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let err = Pipeline::new(config, Box::new(FixtureHttp::new(calls)))
        .run()
        .await
        .unwrap_err();

    match err {
        WrangleError::Format { column, id, .. } => {
            assert_eq!(column, "timestamp");
            assert_eq!(id, "892420643555336193");
        }
        other => panic!("expected a format error, got {other:?}"),
    }
    assert!(!merged.exists());
    Ok(())
}

#[tokio::test]
async fn inner_join_never_exceeds_either_side() -> Result<()> {
    let dir = tempdir()?;
    let (pipeline, _) = pipeline(&dir);
    let gathered = pipeline.gather().await?;
    let corrections = RatingCorrections::load(&corrections_path())?;

    let transformed = Pipeline::transform(&gathered, &corrections)?;
    let cleaned_archive_rows = transformed
        .archive_steps
        .last()
        .map(|s| s.rows_after)
        .unwrap_or_default();
    let cleaned_predictions = CleaningPipeline::for_predictions().run(&gathered.predictions)?;

    assert_eq!(cleaned_archive_rows, 12);
    assert!(
        transformed.master.height()
            <= cleaned_archive_rows.min(cleaned_predictions.frame.height())
    );
    // inputs are left as read
    assert_eq!(gathered.archive.height(), 15);
    assert!(gathered.archive.get_column_index("doggo").is_some());
    Ok(())
}

#[tokio::test]
async fn assessment_flags_archive_problems() -> Result<()> {
    let dir = tempdir()?;
    let (pipeline, _) = pipeline(&dir);
    let gathered = pipeline.gather().await?;
    let assessment = Pipeline::assess(&gathered)?;

    assert_eq!(assessment.tables.len(), 3);
    assert_eq!(assessment.tables[0].rows, 15);
    assert_eq!(assessment.tables[0].columns[0].dtype, "object");
    assert_eq!(assessment.skipped_engagement_lines, 2);

    let rows_for = |column: &str| {
        assessment
            .issues
            .iter()
            .find(|i| i.column.as_deref() == Some(column))
            .map(|i| i.affected_rows)
    };
    assert_eq!(rows_for("expanded_urls"), Some(1));
    assert_eq!(rows_for("retweeted_status_id"), Some(1));
    assert_eq!(rows_for("name"), Some(1));
    assert_eq!(rows_for("text"), Some(4));
    assert_eq!(rows_for("rating_denominator"), Some(2));
    assert!(assessment
        .issues
        .iter()
        .all(|i| i.issue_type != QualityIssueType::DuplicationConcern));
    Ok(())
}

#[tokio::test]
async fn header_only_archive_writes_an_empty_table() -> Result<()> {
    let dir = tempdir()?;
    let original = fs::read_to_string(fixture("twitter-archive-enhanced.csv"))?;
    let header = original.lines().next().unwrap_or_default();
    let empty_archive = dir.path().join("archive.csv");
    fs::write(&empty_archive, format!("{}\n", header))?;

    let config = config_for(dir.path(), &empty_archive);
    let calls = Arc::new(AtomicUsize::new(0));
    let result = Pipeline::new(config, Box::new(FixtureHttp::new(calls)))
        .run()
        .await?;

    assert_eq!(result.archive_rows, 0);
    assert_eq!(result.merged_rows, 0);
    assert_eq!(result.report.unstaged, 0);
    let (header, rows) = read_master(&result.output.path)?;
    assert!(rows.is_empty());
    for column in ["id", "dog_stage", "favorite_count", "jpg_url", "p1_conf"] {
        assert!(header.iter().any(|h| h == column), "{} missing", column);
    }
    let text = fs::read_to_string(&result.output.path)?;
    assert_eq!(text.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn float_formatted_ids_still_join() -> Result<()> {
    let dir = tempdir()?;
    let original = fs::read_to_string(fixture("twitter-archive-enhanced.csv"))?;
    let archive = dir.path().join("archive.csv");
    fs::write(
        &archive,
        original.replace("892420643555336193,,,", "892420643555336193.0,,,"),
    )?;
    let predictions = fs::read_to_string(fixture("image-predictions.tsv"))?
        .replace("892420643555336193\t", "892420643555336193.0\t");

    let config = config_for(dir.path(), &archive);
    let calls = Arc::new(AtomicUsize::new(0));
    let http = FixtureHttp::serving(calls, predictions.into_bytes());
    let result = Pipeline::new(config, Box::new(http)).run().await?;

    assert_eq!(result.merged_rows, 11);
    let (_, rows) = read_master(&result.output.path)?;
    let phineas = &rows["892420643555336193"];
    assert_eq!(phineas["favorite_count"], "39467");
    assert_eq!(phineas["retweet_count"], "8853");
    assert_eq!(phineas["jpg_url"], "https://pbs.twimg.com/media/DGKD1-bXoAAIAUK.jpg");
    assert!(rows.keys().all(|id| !id.contains('.')));
    Ok(())
}

#[tokio::test]
async fn duplicate_post_ids_abort_before_persisting() -> Result<()> {
    let dir = tempdir()?;
    let original = fs::read_to_string(fixture("twitter-archive-enhanced.csv"))?;
    let tilly = original
        .lines()
        .find(|l| l.starts_with("892177421306343426,"))
        .unwrap_or_default()
        .to_string();
    let archive = dir.path().join("archive.csv");
    fs::write(&archive, format!("{}{}\n", original, tilly))?;

    let config = config_for(dir.path(), &archive);
    let merged = config.output.merged.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let err = Pipeline::new(config, Box::new(FixtureHttp::new(calls)))
        .run()
        .await
        .unwrap_err();

    match err {
        WrangleError::Schema(message) => assert!(message.contains("duplicate"), "{}", message),
        other => panic!("expected a schema error, got {other:?}"),
    }
    assert!(!merged.exists());
    Ok(())
}
