//! Viewport exposure and interaction tracking
//!
//! Each tracked entity (a project card, the social block, ...) gets an
//! [`ExposureRecord`] the first time it is seen or clicked. Records are never
//! removed during a session; only [`InteractionTracker::clear`] drops them.

use crate::clock::SharedClock;
use crate::config::InteractionConfig;
use crate::types::{ExposureRecord, InteractionMetrics};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Read-only active time capability, in milliseconds
pub type ActiveTimeFn = Arc<dyn Fn() -> u64 + Send + Sync>;

const MS_PER_MINUTE: f64 = 60_000.0;

/// One visibility observation for a tracked element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionEntry {
    pub id: String,
    /// Visible fraction of the element within the container, 0-1
    pub ratio: f64,
}

/// Per-entity exposure and click aggregator
pub struct InteractionTracker {
    config: InteractionConfig,
    clock: SharedClock,
    page: BaseUrl,
    active_time: Option<ActiveTimeFn>,

    observing: bool,
    observed: BTreeSet<String>,
    records: BTreeMap<String, ExposureRecord>,

    session_start_ms: Option<u64>,
    first_interaction_active_time_ms: Option<u64>,
    total_interactions: u32,
    total_views: u32,
    external_clicks: u32,
}

impl InteractionTracker {
    pub fn new(config: InteractionConfig, clock: SharedClock) -> Self {
        let page = BaseUrl::parse(&config.page_url);
        Self {
            config,
            clock,
            page,
            active_time: None,
            observing: false,
            observed: BTreeSet::new(),
            records: BTreeMap::new(),
            session_start_ms: None,
            first_interaction_active_time_ms: None,
            total_interactions: 0,
            total_views: 0,
            external_clicks: 0,
        }
    }

    /// Install the clock used to time the first interaction.
    pub fn set_active_time_provider(&mut self, provider: ActiveTimeFn) {
        self.active_time = Some(provider);
    }

    /// Begin observing the elements currently present in the container.
    pub fn start_tracking<I, S>(&mut self, tracked_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.observed = tracked_ids.into_iter().map(Into::into).collect();
        self.observing = true;
        if self.session_start_ms.is_none() {
            self.session_start_ms = Some(self.clock.now_ms());
        }
        debug!(elements = self.observed.len(), "visibility observer started");
    }

    /// Observe an element added after tracking started.
    pub fn observe(&mut self, id: impl Into<String>) {
        self.observed.insert(id.into());
    }

    pub fn is_tracking(&self) -> bool {
        self.observing
    }

    /// Apply a batch of visibility observations.
    pub fn handle_intersections(&mut self, entries: &[IntersectionEntry]) {
        if !self.observing {
            return;
        }
        let now = self.clock.now_ms();
        for entry in entries {
            if !self.observed.contains(&entry.id) || !entry.ratio.is_finite() {
                continue;
            }
            if entry.ratio >= self.config.visibility_threshold {
                self.view_in(&entry.id, now);
            } else {
                self.view_out(&entry.id, now);
            }
        }
    }

    fn view_in(&mut self, id: &str, now: u64) {
        let record = self.records.entry(id.to_string()).or_default();
        if record.is_currently_in_view {
            return;
        }
        record.exposures += 1;
        record.view_start_ms = Some(now);
        record.is_currently_in_view = true;
        record.last_seen_ms = now;
        self.total_views += 1;
    }

    fn view_out(&mut self, id: &str, now: u64) {
        let Some(record) = self.records.get_mut(id) else {
            return;
        };
        if !record.is_currently_in_view {
            return;
        }
        if let Some(start) = record.view_start_ms {
            record.view_time_ms += now.saturating_sub(start);
        }
        record.is_currently_in_view = false;
        record.last_seen_ms = now;
        if let Some(rate) = rate_per_minute(record.total_interactions, record.view_time_ms) {
            record.interaction_rate_per_minute = rate;
        }
    }

    /// A button belonging to `id` was clicked.
    pub fn record_button_click(&mut self, id: &str) {
        self.record_interaction(id);
    }

    /// A link belonging to `id` was clicked. Returns whether it was external.
    pub fn record_link_click(&mut self, id: &str, href: &str) -> bool {
        self.record_interaction(id);

        let external = resolve_hostname(href, &self.page) != self.page.host;
        if external {
            if let Some(record) = self.records.get_mut(id) {
                record.external_clicks += 1;
            }
            self.external_clicks += 1;
        }
        external
    }

    fn record_interaction(&mut self, id: &str) {
        let now = self.clock.now_ms();

        if self.first_interaction_active_time_ms.is_none() {
            let active = match &self.active_time {
                Some(provider) => provider(),
                None => now.saturating_sub(self.session_start_ms.unwrap_or(now)),
            };
            self.first_interaction_active_time_ms = Some(active);
        }

        let record = self.records.entry(id.to_string()).or_default();
        record.total_interactions += 1;
        record.first_interaction_ms.get_or_insert(now);
        record.last_seen_ms = now;
        self.total_interactions += 1;
    }

    /// Snapshot with live interaction rates for entities still in view.
    pub fn metrics(&self) -> InteractionMetrics {
        let now = self.clock.now_ms();
        let entities = self
            .records
            .iter()
            .map(|(id, record)| {
                let mut snapshot = record.clone();
                if let (true, Some(start)) = (record.is_currently_in_view, record.view_start_ms) {
                    let live_view_ms = record.view_time_ms + now.saturating_sub(start);
                    if let Some(rate) = rate_per_minute(record.total_interactions, live_view_ms) {
                        snapshot.interaction_rate_per_minute = rate;
                    }
                }
                (id.clone(), snapshot)
            })
            .collect();

        InteractionMetrics {
            session_start_ms: self.session_start_ms,
            first_interaction_active_time_ms: self.first_interaction_active_time_ms,
            total_interactions: self.total_interactions,
            total_views: self.total_views,
            external_clicks: self.external_clicks,
            entities,
        }
    }

    /// Record for a single entity
    pub fn record(&self, id: &str) -> Option<&ExposureRecord> {
        self.records.get(id)
    }

    /// Close every open view span and stop observing.
    pub fn stop_tracking(&mut self) {
        let now = self.clock.now_ms();
        let in_view: Vec<String> = self
            .records
            .iter()
            .filter(|(_, r)| r.is_currently_in_view)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &in_view {
            self.view_out(id, now);
        }
        if self.observing {
            debug!(closed_views = in_view.len(), "visibility observer disconnected");
        }
        self.observing = false;
    }

    /// Stop and drop every record and counter.
    pub fn clear(&mut self) {
        self.stop_tracking();
        self.observed.clear();
        self.records.clear();
        self.session_start_ms = None;
        self.first_interaction_active_time_ms = None;
        self.total_interactions = 0;
        self.total_views = 0;
        self.external_clicks = 0;
    }
}

/// Interactions per minute of view time; `None` when there is no view time
fn rate_per_minute(interactions: u32, view_time_ms: u64) -> Option<f64> {
    if view_time_ms == 0 {
        return None;
    }
    Some(interactions as f64 * MS_PER_MINUTE / view_time_ms as f64)
}

/// Schemes whose URLs always carry a host and treat `\\` as `/`
const SPECIAL_SCHEMES: [&str; 6] = ["http", "https", "ws", "wss", "ftp", "file"];

/// Scheme and host of the page links are followed from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct BaseUrl {
    scheme: String,
    host: String,
}

impl BaseUrl {
    fn parse(url: &str) -> Self {
        let scheme = split_scheme(url.trim())
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default();
        let host = resolve_hostname(url, &Self::default());
        Self { scheme, host }
    }
}

fn is_special(scheme: &str) -> bool {
    SPECIAL_SCHEMES.contains(&scheme)
}

fn is_slash(c: char, special: bool) -> bool {
    c == '/' || (special && c == '\\')
}

/// Strip a leading `//` (or `\\\\` under a special scheme), if present.
fn strip_authority_prefix(rest: &str, special: bool) -> Option<&str> {
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if is_slash(a, special) && is_slash(b, special) => Some(&rest[2..]),
        _ => None,
    }
}

/// Hostname `href` resolves to when followed from a page at `base`.
///
/// Follows the host part of WHATWG URL parsing:
/// - relative references (`/x`, `x`, `#x`, `?x`) keep the base host
/// - `//host/...` takes that host; under a special base scheme `\\\\host` does too
/// - a special scheme equal to the base scheme and not followed by `//` is a
///   relative reference (`https:projects/x` from an https page stays on the
///   page host)
/// - any other special scheme skips all leading slashes and backslashes and
///   takes the host after them (`http:example.com` is `example.com`)
/// - non-special schemes without `//` (`mailto:`, `tel:`) have no host
///
/// Hosts are lowercased and stripped of credentials and port.
fn resolve_hostname(href: &str, base: &BaseUrl) -> String {
    let href = href.trim();
    let base_special = is_special(&base.scheme);

    match split_scheme(href) {
        None => match strip_authority_prefix(href, base_special) {
            Some(authority) => authority_host(authority, base_special),
            None => base.host.clone(),
        },
        Some((scheme, rest)) => {
            let scheme = scheme.to_ascii_lowercase();
            if !is_special(&scheme) {
                return match strip_authority_prefix(rest, false) {
                    Some(authority) => authority_host(authority, false),
                    None => String::new(),
                };
            }
            if scheme == base.scheme && strip_authority_prefix(rest, true).is_none() {
                return base.host.clone();
            }
            authority_host(rest.trim_start_matches(['/', '\\']), true)
        }
    }
}

fn split_scheme(href: &str) -> Option<(&str, &str)> {
    let colon = href.find(':')?;
    let scheme = &href[..colon];
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| (scheme, &href[colon + 1..]))
}

fn authority_host(rest: &str, special: bool) -> String {
    let authority = rest
        .split(|c: char| matches!(c, '?' | '#') || is_slash(c, special))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();

    let host = if let Some(v6) = host_port.strip_prefix('[') {
        v6.split(']').next().unwrap_or_default()
    } else {
        host_port.split(':').next().unwrap_or_default()
    };
    host.to_ascii_lowercase()
}
