//! Incremental release and pull-request synchronization
//!
//! Each cycle refreshes a repository's release set from the code-hosting
//! service. Full history is paged through only when the latest remote tag is
//! not yet known locally; otherwise the cycle keeps known non-preview
//! releases and only refreshes previews, bounding steady-state work to two
//! cheap requests.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::crd::{Release, ReleaseLevel};
use crate::forge::{ForgeClient, RemotePullRequest, RemoteRelease};
use crate::Error;

/// Run one release sync cycle.
///
/// Returns `Ok(None)` when the cycle is gated by the reconciliation period;
/// the caller advances `last_update` only on `Ok(Some(..))`. Any remote error
/// aborts the cycle without touching local state, so the next tick retries
/// promptly.
#[allow(clippy::too_many_arguments)]
pub async fn sync(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
    now: DateTime<Utc>,
    last_update: Option<DateTime<Utc>>,
    period: Duration,
    current: &[Release],
    max_available: Option<u32>,
) -> Result<Option<Vec<Release>>, Error> {
    if let Some(last) = last_update {
        let period = chrono::Duration::from_std(period)
            .map_err(|e| Error::validation(format!("reconciliation period out of range: {e}")))?;
        if now < last + period {
            debug!(owner, repo, "release sync gated by reconciliation period");
            return Ok(None);
        }
    }

    let latest = match forge.latest_release(token, owner, repo).await {
        Ok(release) => Some(release),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    // The latest tag being known locally means history has not moved; skip
    // the full listing and keep the non-preview entries we already have.
    let fetch_all = match latest {
        Some(ref latest) => !current.iter().any(|r| r.tag == latest.tag_name),
        None => true,
    };

    let mut merged = if fetch_all {
        fetch_all_releases(forge, token, owner, repo).await?
    } else {
        current.iter().filter(|r| !r.is_preview()).cloned().collect()
    };

    let pulls = forge.list_open_pulls(token, owner, repo).await?;
    let mut seen: HashSet<(String, String)> = merged
        .iter()
        .map(|r| (r.name.clone(), r.tag.clone()))
        .collect();
    for pull in &pulls {
        let preview = preview_release(pull);
        if seen.insert((preview.name.clone(), preview.tag.clone())) {
            merged.push(preview);
        }
    }

    if let Some(max) = max_available.filter(|m| *m > 0) {
        truncate_available(&mut merged, max as usize);
    }

    log_diff(owner, repo, current, &merged);
    Ok(Some(merged))
}

/// Page through the complete release listing, excluding drafts.
///
/// Pagination is a lazy loop over [`crate::forge::Page`] handles; a
/// mid-pagination error short-circuits the cycle instead of returning a
/// partially fetched history.
async fn fetch_all_releases(
    forge: &dyn ForgeClient,
    token: &str,
    owner: &str,
    repo: &str,
) -> Result<Vec<Release>, Error> {
    let mut releases = Vec::new();
    let mut page = 1u32;

    loop {
        let listing = forge.list_releases(token, owner, repo, page).await?;
        releases.extend(listing.items.iter().filter_map(classify));
        match listing.next {
            Some(next) => page = next,
            None => break,
        }
    }

    Ok(releases)
}

/// Classify one remote release; drafts are never persisted
fn classify(remote: &RemoteRelease) -> Option<Release> {
    if remote.draft {
        return None;
    }

    let level = if remote.prerelease {
        ReleaseLevel::Candidate
    } else {
        ReleaseLevel::Release
    };

    let name = match remote.name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => remote.tag_name.clone(),
    };

    Some(Release {
        name,
        tag: remote.tag_name.clone(),
        level,
        release_time: remote.published_at,
        deployment: None,
    })
}

/// Convert an open pull request into a preview release keyed by
/// (head ref, head SHA)
fn preview_release(pull: &RemotePullRequest) -> Release {
    Release {
        name: pull.head.branch.clone(),
        tag: pull.head.sha.clone(),
        level: ReleaseLevel::Preview,
        release_time: pull.updated_at,
        deployment: None,
    }
}

/// Keep only the newest `max` non-preview releases; previews are exempt
fn truncate_available(releases: &mut Vec<Release>, max: usize) {
    let mut tagged: Vec<Release> = Vec::new();
    let mut previews: Vec<Release> = Vec::new();
    for release in releases.drain(..) {
        if release.is_preview() {
            previews.push(release);
        } else {
            tagged.push(release);
        }
    }

    tagged.sort_by(|a, b| b.release_time.cmp(&a.release_time));
    tagged.truncate(max);
    tagged.extend(previews);
    *releases = tagged;
}

/// Diff old vs new by tag, for logging only
fn log_diff(owner: &str, repo: &str, old: &[Release], new: &[Release]) {
    let old_tags: HashSet<&str> = old.iter().map(|r| r.tag.as_str()).collect();
    let new_tags: HashSet<&str> = new.iter().map(|r| r.tag.as_str()).collect();

    let added = new_tags.difference(&old_tags).count();
    let removed = old_tags.difference(&new_tags).count();
    if added > 0 || removed > 0 {
        info!(owner, repo, added, removed, total = new.len(), "release set changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::{ForgeError, MockForgeClient, Page, PullRequestHead};

    fn release(name: &str, tag: &str, level: ReleaseLevel) -> Release {
        Release {
            name: name.to_string(),
            tag: tag.to_string(),
            level,
            release_time: None,
            deployment: None,
        }
    }

    fn remote(tag: &str, draft: bool, prerelease: bool) -> RemoteRelease {
        RemoteRelease {
            tag_name: tag.to_string(),
            name: Some(tag.to_string()),
            draft,
            prerelease,
            published_at: None,
        }
    }

    fn pull(branch: &str, sha: &str) -> RemotePullRequest {
        RemotePullRequest {
            number: 1,
            updated_at: None,
            head: PullRequestHead {
                branch: branch.to_string(),
                sha: sha.to_string(),
            },
        }
    }

    /// Story: a cycle firing inside the reconciliation period makes no remote
    /// calls and leaves everything untouched. The mock has no expectations,
    /// so any remote call would panic the test.
    #[tokio::test]
    async fn story_gated_cycle_makes_no_remote_calls() {
        let forge = MockForgeClient::new();
        let now = Utc::now();
        let last = now - chrono::Duration::minutes(5);

        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            now,
            Some(last),
            Duration::from_secs(600),
            &[release("foo", "1", ReleaseLevel::Release)],
            None,
        )
        .await
        .unwrap();

        assert!(result.is_none());
    }

    /// Story: an unseen latest tag triggers a full history fetch that pages
    /// until exhaustion, classifies levels, and drops drafts.
    #[tokio::test]
    async fn story_new_tag_triggers_full_fetch() {
        let mut forge = MockForgeClient::new();
        forge
            .expect_latest_release()
            .returning(|_, _, _| Ok(remote("v2.0.0", false, false)));
        forge
            .expect_list_releases()
            .withf(|_, _, _, page| *page == 1)
            .returning(|_, _, _, _| {
                Ok(Page {
                    items: vec![remote("v2.0.0", false, false), remote("v2.0.0-rc1", false, true)],
                    next: Some(2),
                })
            });
        forge
            .expect_list_releases()
            .withf(|_, _, _, page| *page == 2)
            .returning(|_, _, _, _| {
                Ok(Page {
                    items: vec![remote("v1.0.0", false, false), remote("wip", true, false)],
                    next: None,
                })
            });
        forge
            .expect_list_open_pulls()
            .returning(|_, _, _| Ok(vec![pull("feature/x", "abc123")]));

        let current = vec![release("v1.0.0", "v1.0.0", ReleaseLevel::Release)];
        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &current,
            None,
        )
        .await
        .unwrap()
        .unwrap();

        let tags: Vec<&str> = result.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["v2.0.0", "v2.0.0-rc1", "v1.0.0", "abc123"]);

        assert_eq!(result[0].level, ReleaseLevel::Release);
        assert_eq!(result[1].level, ReleaseLevel::Candidate);
        assert_eq!(result[3].level, ReleaseLevel::Preview);
        // The draft never appears
        assert!(!result.iter().any(|r| r.tag == "wip"));
    }

    /// Story: when the latest tag is already known, the cycle keeps existing
    /// non-preview releases untouched and only refreshes previews.
    #[tokio::test]
    async fn story_known_tag_skips_history_and_refreshes_previews() {
        let mut forge = MockForgeClient::new();
        forge
            .expect_latest_release()
            .returning(|_, _, _| Ok(remote("v1.0.0", false, false)));
        forge
            .expect_list_open_pulls()
            .returning(|_, _, _| Ok(vec![pull("feature/new", "def456")]));
        // No list_releases expectation: a full fetch would panic.

        let current = vec![
            release("v1.0.0", "v1.0.0", ReleaseLevel::Release),
            release("feature/old", "abc123", ReleaseLevel::Preview),
        ];
        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &current,
            None,
        )
        .await
        .unwrap()
        .unwrap();

        let tags: Vec<&str> = result.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["v1.0.0", "def456"]);
        assert!(!result.iter().any(|r| r.tag == "abc123"), "stale preview kept");
    }

    /// Story: a repository with no tagged releases and no local state is
    /// valid; the sync converges on whatever previews exist.
    #[tokio::test]
    async fn story_empty_remote_and_local_is_valid() {
        let mut forge = MockForgeClient::new();
        forge
            .expect_latest_release()
            .returning(|_, _, _| Err(ForgeError::NotFound));
        forge.expect_list_releases().returning(|_, _, _, _| {
            Ok(Page {
                items: vec![],
                next: None,
            })
        });
        forge.expect_list_open_pulls().returning(|_, _, _| Ok(vec![]));

        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &[],
            None,
        )
        .await
        .unwrap()
        .unwrap();

        assert!(result.is_empty());
    }

    /// Story: a transient API failure mid-cycle aborts without producing a
    /// release set, so last_update stays untouched and the next tick retries.
    #[tokio::test]
    async fn story_transient_failure_aborts_the_cycle() {
        let mut forge = MockForgeClient::new();
        forge.expect_latest_release().returning(|_, _, _| {
            Err(ForgeError::Status {
                code: 500,
                message: "boom".to_string(),
            })
        });

        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &[],
            None,
        )
        .await;

        assert!(result.is_err());
    }

    /// Story: the release set never holds two entries with the same
    /// (name, tag), even when a preview collides across cycles.
    #[tokio::test]
    async fn story_merge_deduplicates_by_name_and_tag() {
        let mut forge = MockForgeClient::new();
        forge
            .expect_latest_release()
            .returning(|_, _, _| Ok(remote("v1.0.0", false, false)));
        forge.expect_list_open_pulls().returning(|_, _, _| {
            Ok(vec![pull("feature/x", "abc123"), pull("feature/x", "abc123")])
        });

        let current = vec![release("v1.0.0", "v1.0.0", ReleaseLevel::Release)];
        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &current,
            None,
        )
        .await
        .unwrap()
        .unwrap();

        let previews = result.iter().filter(|r| r.is_preview()).count();
        assert_eq!(previews, 1);
    }

    /// Story: maxAvailable caps persisted tagged releases at the newest N
    /// while previews are exempt from the cap.
    #[tokio::test]
    async fn story_max_available_caps_tagged_releases() {
        let mut forge = MockForgeClient::new();
        forge
            .expect_latest_release()
            .returning(|_, _, _| Ok(remote("v3", false, false)));
        forge.expect_list_releases().returning(|_, _, _, _| {
            let mut items = Vec::new();
            for (i, tag) in ["v3", "v2", "v1"].iter().enumerate() {
                items.push(RemoteRelease {
                    tag_name: tag.to_string(),
                    name: Some(tag.to_string()),
                    draft: false,
                    prerelease: false,
                    published_at: Some(Utc::now() - chrono::Duration::days(i as i64)),
                });
            }
            Ok(Page { items, next: None })
        });
        forge
            .expect_list_open_pulls()
            .returning(|_, _, _| Ok(vec![pull("feature/x", "abc123")]));

        let result = sync(
            &forge,
            "tok",
            "acme",
            "widgets",
            Utc::now(),
            None,
            Duration::from_secs(600),
            &[],
            Some(2),
        )
        .await
        .unwrap()
        .unwrap();

        let tags: Vec<&str> = result.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["v3", "v2", "abc123"]);
    }
}
