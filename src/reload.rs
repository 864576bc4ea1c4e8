//! Live-reload broadcasting.
//!
//! Stages publish a [`ReloadKind`] through the [`ReloadBroadcaster`] trait
//! after they finish writing. `build` uses [`NoReload`]; `develop` uses the
//! in-process [`LiveReload`] hub owned by the dev server.
//!
//! ## Protocol
//!
//! The hub counts broadcasts in a generation number. A browser long-polls
//! `GET /__pagesmith/reload?since=N`; the request returns as soon as the
//! generation passes `N` (or after a timeout) with
//!
//! ```json
//! { "generation": 7, "kind": "styles" }
//! ```
//!
//! `kind` merges every broadcast after `N`: `styles` only when all of them
//! were stylesheet changes, `full` otherwise. The client swaps `<link>`
//! stylesheets for `styles` and reloads the page for `full`.

use crate::types::ReloadKind;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub const CLIENT_PATH: &str = "/__pagesmith/client.js";
pub const RELOAD_PATH: &str = "/__pagesmith/reload";

/// Broadcasts older than this many generations are forgotten; a client that
/// fell that far behind gets a full reload.
const HISTORY: usize = 64;

/// Receives "output changed" notifications from stages and the watcher.
pub trait ReloadBroadcaster: Send + Sync {
    fn broadcast(&self, kind: ReloadKind);
}

/// Discards every broadcast.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl ReloadBroadcaster for NoReload {
    fn broadcast(&self, _kind: ReloadKind) {}
}

/// Answer to one long-poll request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadNotice {
    pub generation: u64,
    /// `None` when the poll timed out with nothing new.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReloadKind>,
}

#[derive(Debug, Default)]
struct HubState {
    generation: u64,
    recent: VecDeque<(u64, ReloadKind)>,
}

impl HubState {
    fn notice_since(&self, since: u64) -> ReloadNotice {
        if since >= self.generation {
            return ReloadNotice {
                generation: self.generation,
                kind: None,
            };
        }
        let oldest_kept = self.recent.front().map(|(g, _)| *g).unwrap_or(u64::MAX);
        let kind = if since + 1 < oldest_kept {
            ReloadKind::Full
        } else {
            self.recent
                .iter()
                .filter(|(g, _)| *g > since)
                .map(|(_, k)| *k)
                .reduce(ReloadKind::merge)
                .unwrap_or(ReloadKind::Full)
        };
        ReloadNotice {
            generation: self.generation,
            kind: Some(kind),
        }
    }
}

/// In-process reload hub shared by stages, the watcher, and the dev server.
#[derive(Debug, Default)]
pub struct LiveReload {
    state: Mutex<HubState>,
    changed: Condvar,
}

impl LiveReload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).generation
    }

    /// Block until a broadcast newer than `since` arrives or `timeout` elapses.
    pub fn wait_since(&self, since: u64, timeout: Duration) -> ReloadNotice {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while state.generation <= since {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        state.notice_since(since)
    }
}

impl ReloadBroadcaster for LiveReload {
    fn broadcast(&self, kind: ReloadKind) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.generation += 1;
        let generation = state.generation;
        state.recent.push_back((generation, kind));
        if state.recent.len() > HISTORY {
            state.recent.pop_front();
        }
        drop(state);
        tracing::debug!(generation, ?kind, "reload broadcast");
        self.changed.notify_all();
    }
}

/// Browser side of the protocol, served at [`CLIENT_PATH`].
pub const CLIENT_SCRIPT: &str = r#"(function () {
  var since = null;
  function swapStyles() {
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    for (var i = 0; i < links.length; i++) {
      var url = new URL(links[i].href);
      url.searchParams.set("__reload", Date.now());
      links[i].href = url.toString();
    }
  }
  function poll() {
    var url = "/__pagesmith/reload" + (since === null ? "" : "?since=" + since);
    fetch(url, { cache: "no-store" })
      .then(function (r) { return r.json(); })
      .then(function (notice) {
        if (since !== null && notice.kind === "styles") swapStyles();
        else if (since !== null && notice.kind === "full") return location.reload();
        since = notice.generation;
        poll();
      })
      .catch(function () { setTimeout(poll, 1000); });
  }
  poll();
})();
"#;

/// Insert the client `<script>` before `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!("<script src=\"{CLIENT_PATH}\"></script>");
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{html}{tag}"),
    }
}
