//! End-to-end CLI tests for the titlesync binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use titlesync_core::{
    CacheKey, CachePolicy, Database, LookupCache, RawEntry, ResolutionStatus, UnresolvedReason,
    Verdict,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

/// Binary isolated from the caller's config, cache, `.env` and TMDB settings.
fn titlesync(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("titlesync").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env_remove("TMDB_API_KEY")
        .env_remove("TMDB_BASE_URL")
        .env_remove("ENABLE_TMDB")
        .env_remove("INCLUDE_YEAR")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_binary_help_displays_usage() {
    let home = tempfile::tempdir().unwrap();
    titlesync(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve scraped movie and TV titles"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = tempfile::tempdir().unwrap();
    titlesync(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("titlesync"));
}

#[test]
fn test_binary_without_command_fails() {
    let home = tempfile::tempdir().unwrap();
    titlesync(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_resolve_without_api_key_exits_with_config_error() {
    let home = tempfile::tempdir().unwrap();
    let input = home.path().join("raw.txt");
    std::fs::write(&input, "Inception (2010)\n").unwrap();

    titlesync(home.path())
        .args(["resolve", "raw.txt", "-o", "list.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("TMDB_API_KEY"));
    assert!(!home.path().join("list.txt").exists());
}

#[test]
fn test_invalid_env_flag_exits_with_config_error() {
    let home = tempfile::tempdir().unwrap();
    titlesync(home.path())
        .env("ENABLE_TMDB", "maybe")
        .args(["dedupe", "list.txt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ENABLE_TMDB"));
}

#[test]
fn test_resolve_without_matching_writes_titles_verbatim() {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("raw.txt"), "Dark\nSeverance\ndark\n").unwrap();
    std::fs::write(home.path().join("list.txt"), "Heat (1995) [movie:949]\n").unwrap();

    titlesync(home.path())
        .args(["--no-match", "resolve", "raw.txt", "-o", "list.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("matching disabled"));

    assert_eq!(
        std::fs::read_to_string(home.path().join("list.txt")).unwrap(),
        "Heat (1995) [movie:949]\nDark\nSeverance\n"
    );
}

#[test]
fn test_dedupe_collapses_duplicate_identities() {
    let home = tempfile::tempdir().unwrap();
    let list = home.path().join("list.txt");
    std::fs::write(
        &list,
        "Breaking Bad (2008) [1396]\nBreaking Bad [1396]\nInception (2010) [movie:27205]\nThe Office [Error]\nthe office [2316]\n",
    )
    .unwrap();

    titlesync(home.path())
        .args(["-q", "dedupe", "list.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 duplicates removed"));

    assert_eq!(
        std::fs::read_to_string(&list).unwrap(),
        "Breaking Bad (2008) [1396]\nInception (2010) [movie:27205]\nthe office [2316]\n"
    );
}

#[test]
fn test_dedupe_without_year_drops_years() {
    let home = tempfile::tempdir().unwrap();
    let list = home.path().join("list.txt");
    std::fs::write(&list, "Inception (2010) [movie:27205]\n").unwrap();

    titlesync(home.path())
        .args(["--no-year", "dedupe", "list.txt"])
        .assert()
        .success();

    assert_eq!(
        std::fs::read_to_string(&list).unwrap(),
        "Inception [movie:27205]\n"
    );
}

#[test]
fn test_purge_cache_needs_no_api_key() {
    let home = tempfile::tempdir().unwrap();
    titlesync(home.path())
        .arg("purge-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 cached no-match entries"));
}

/// Stores one no-match verdict in the cache the binary will open under `home`.
fn seed_negative_cache_entry(home: &Path, title: &str) {
    let db_path = home
        .join("cache")
        .join("titlesync")
        .join("titlesync-cache.db");
    tokio_test::block_on(async {
        let db = Database::new(&db_path).await.unwrap();
        let cache = LookupCache::load(db, CachePolicy::default()).await.unwrap();
        let raw = RawEntry::new(title, "seed");
        let record = Verdict::new(ResolutionStatus::Unresolved(UnresolvedReason::NoMatch))
            .into_record(raw.clone());
        cache.put(CacheKey::for_entry(&raw), record).await.unwrap();
        cache.flush().await.unwrap();
    });
}

#[test]
fn test_purge_cache_removes_seeded_no_match() {
    let home = tempfile::tempdir().unwrap();
    seed_negative_cache_entry(home.path(), "Nowhere Special");

    titlesync(home.path())
        .arg("purge-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 cached no-match entries"));

    titlesync(home.path())
        .arg("purge-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0 cached no-match entries"));
}

#[tokio::test]
async fn test_resolve_against_mock_tmdb_writes_list() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .and(query_param("query", "Inception"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 27205, "title": "Inception", "release_date": "2010-07-15"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .and(query_param("query", "Mystery Title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let home = tempfile::tempdir().unwrap();
    std::fs::write(
        home.path().join("raw.txt"),
        "Inception (2010)\nInception (2010)\nMystery Title\n",
    )
    .unwrap();
    let base_url = server.uri();
    let home_path = home.path().to_path_buf();

    tokio::task::spawn_blocking(move || {
        titlesync(&home_path)
            .env("TMDB_API_KEY", "test-key")
            .env("TMDB_BASE_URL", base_url)
            .args(["-q", "--rps", "0", "resolve", "raw.txt", "-o", "list.txt"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote list.txt (1 titles, 1 need attention)"));
    })
    .await
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(home.path().join("list.txt")).unwrap(),
        "Inception (2010) [movie:27205]\nMystery Title [Error]\n"
    );
    assert!(home.path().join("cache").join("titlesync").exists());
}
