//! Line classifiers.
//!
//! Each classifier recognizes one kind of event in the text that follows the
//! timestamp prefix and, on a match, folds it into [`LogState`]. The
//! [`ClassifierSet`] tries them in a fixed priority order and stops at the
//! first match.
//!
//! # Ordering
//!
//! The order is load-bearing:
//!
//! - Chat comes first because it is by far the most frequent line.
//! - Every classifier declares a line-start marker that is checked before its
//!   regex runs. Chat lines start with `<`, join/leave with `*** <`, emotes
//!   with `* <` and server broadcasts with `# Server: `, so an emote such as
//!   `* <Alice> waves` can never be read as chat and `*** <Alice> joined`
//!   never as an emote.
//! - Player deaths run before the murder templates: both read
//!   `... was <killed> by ...`, and the player form is the more specific one.
//! - The generic per-player counters (kick, mute, mark) come after the death
//!   patterns so that `<X> was ...` lines are only counted once.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

use crate::event_kind::EventKind;
use crate::mob::{MobMessages, Slain};
use crate::state::{CleanupEvent, LogState, PlayerRecord};

/// `<name>` with an optional position annotation: ` [Realm: x,y,z]`,
/// ` [Realm:x,y,z]` or the older realm-less ` [x,y,z]`.
const NAME: &str = r"<(?P<name>[^<>]+?)(?: \[(?:[^\]:]*: ?)?-?\d*,-?\d*,-?\d*\])?>";

/// Chat variant of [`NAME`]: `!` around the name marks a shout.
const CHAT_NAME: &str =
    r"^<(?P<shout>!)?(?P<name>[^<>]+?)(?: \[(?:[^\]:]*: ?)?-?\d*,-?\d*,-?\d*\])?!?>";

const CHAT_MARKER: &str = "<";
const SESSION_MARKER: &str = "*** <";
const EMOTE_MARKER: &str = "* <";
const SERVER_MARKER: &str = "# Server: ";

/// A single rule recognizing one event kind.
pub trait Classifier: Send + Sync {
    fn kind(&self) -> EventKind;

    /// Text the payload must start with before [`Classifier::try_match`] is
    /// attempted.
    fn marker(&self) -> &'static str;

    /// Attempts to recognize `text`; mutates `state` only when it returns
    /// `true`.
    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool;
}

fn server(tail: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^{}{tail}$", regex::escape(SERVER_MARKER)))
}

fn name<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.name("name").map(|m| m.as_str())
}

fn number(caps: &Captures<'_>, group: &str) -> Option<u64> {
    caps.name(group)?.as_str().parse().ok()
}

/// Public chat: `<Alice> hello`, `<!Alice [Caverns: 1,2,3]!> HELP`.
struct Chat {
    re: Regex,
}

impl Classifier for Chat {
    fn kind(&self) -> EventKind {
        EventKind::Chat
    }

    fn marker(&self) -> &'static str {
        CHAT_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(caps) = self.re.captures(text) else {
            return false;
        };
        let Some(mut name) = name(&caps) else {
            return false;
        };
        // The strict annotation grammar failed, so the name swallowed the
        // bracket. Keep only what precedes it.
        if let Some(cut) = name.find(" [") {
            state.anomalies.malformed_names += 1;
            tracing::debug!(player = name, "chat name with unparsed annotation");
            name = &name[..cut];
        }
        if name.is_empty() {
            return false;
        }

        let player = state.ensure_player(name, timestamp);
        player.n_messages += 1;
        if caps.name("shout").is_some() {
            player.n_shouts += 1;
        }
        player.touch(timestamp);
        true
    }
}

/// `*** <Alice> joined the game.`
struct Join {
    re: Regex,
}

impl Classifier for Join {
    fn kind(&self) -> EventKind {
        EventKind::Join
    }

    fn marker(&self) -> &'static str {
        SESSION_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(name) = self.re.captures(text).as_ref().and_then(name) else {
            return false;
        };
        state.start_session(name, timestamp);
        true
    }
}

/// `*** <Alice> left the game.`, optionally followed by a remark such as
/// `(Timed out)`.
struct Leave {
    re: Regex,
}

impl Classifier for Leave {
    fn kind(&self) -> EventKind {
        EventKind::Leave
    }

    fn marker(&self) -> &'static str {
        SESSION_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(name) = self.re.captures(text).as_ref().and_then(name) else {
            return false;
        };
        state.end_session(name, timestamp);
        true
    }
}

/// `# Server: <Alice> has plane shifted to Caverns.`
struct PlaneShift {
    re: Regex,
}

impl Classifier for PlaneShift {
    fn kind(&self) -> EventKind {
        EventKind::PlaneShift
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(caps) = self.re.captures(text) else {
            return false;
        };
        let (Some(name), Some(plane)) = (name(&caps), caps.name("plane")) else {
            return false;
        };
        let player = state.ensure_player(name, timestamp);
        player.planes.insert(plane.as_str().to_string());
        player.touch(timestamp);
        true
    }
}

/// `# Server: Mapgen scrambling. Blame <Alice> for lag. Chunks: 12.`
struct MapgenBlame {
    re: Regex,
}

impl Classifier for MapgenBlame {
    fn kind(&self) -> EventKind {
        EventKind::MapgenBlame
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(caps) = self.re.captures(text) else {
            return false;
        };
        let (Some(name), Some(chunks)) = (name(&caps), number(&caps, "chunks")) else {
            return false;
        };
        state.add_chunks_for_day(timestamp, chunks);
        if let Some(player) = state.known_player(name, "mapgen") {
            player.n_chunks_generated += chunks;
            player.touch(timestamp);
        }
        true
    }
}

/// `# Server: Mapgen working, expect lag. (Chunks: 12.)`
struct MapgenAnonymous {
    re: Regex,
}

impl Classifier for MapgenAnonymous {
    fn kind(&self) -> EventKind {
        EventKind::MapgenAnonymous
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(chunks) = self
            .re
            .captures(text)
            .and_then(|caps| number(&caps, "chunks"))
        else {
            return false;
        };
        state.add_chunks_for_day(timestamp, chunks);
        true
    }
}

/// `# Server: <Alice> was viciously wasted by an irascible Oerkki.`
struct PlayerDeath {
    messages: MobMessages,
}

impl Classifier for PlayerDeath {
    fn kind(&self) -> EventKind {
        EventKind::PlayerDeath
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(death) = text
            .strip_prefix(SERVER_MARKER)
            .and_then(|rest| self.messages.player_death(rest))
        else {
            return false;
        };
        *state
            .world
            .kills_by_mob
            .entry(death.mob.to_string())
            .or_insert(0) += 1;
        if let Some(player) = state.known_player(death.player, "death") {
            player.n_deaths += 1;
            player.touch(timestamp);
        }
        true
    }
}

/// A mob slain by a player, in any of the murder templates.
struct MobKill {
    messages: MobMessages,
}

impl Classifier for MobKill {
    fn kind(&self) -> EventKind {
        EventKind::MobKill
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, _timestamp: DateTime<Utc>) -> bool {
        let Some(slain) = text
            .strip_prefix(SERVER_MARKER)
            .and_then(|rest| self.messages.slain_mob(rest))
        else {
            return false;
        };
        if let Slain::Mob(mob) = slain {
            *state.world.deaths_by_mob.entry(mob.to_string()).or_insert(0) += 1;
        }
        true
    }
}

fn n_soliloquies(p: &mut PlayerRecord) -> &mut u64 {
    &mut p.n_soliloquies
}

fn n_suicides(p: &mut PlayerRecord) -> &mut u64 {
    &mut p.n_suicides
}

fn n_kicks(p: &mut PlayerRecord) -> &mut u64 {
    &mut p.n_kicks
}

fn n_duct_tapes(p: &mut PlayerRecord) -> &mut u64 {
    &mut p.n_duct_tapes
}

fn n_marks(p: &mut PlayerRecord) -> &mut u64 {
    &mut p.n_marks
}

/// A line naming one player whose only effect is bumping one counter.
struct PlayerCounter {
    kind: EventKind,
    marker: &'static str,
    re: Regex,
    /// Whether this event may be the first sighting of a player.
    creates_player: bool,
    counter: fn(&mut PlayerRecord) -> &mut u64,
}

impl Classifier for PlayerCounter {
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn marker(&self) -> &'static str {
        self.marker
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(name) = self.re.captures(text).as_ref().and_then(name) else {
            return false;
        };
        let player = if self.creates_player {
            Some(state.ensure_player(name, timestamp))
        } else {
            state.known_player(name, self.kind.as_str())
        };
        if let Some(player) = player {
            *(self.counter)(&mut *player) += 1;
            player.touch(timestamp);
        }
        true
    }
}

/// `# Server: Account cleanup complete. 1234 accounts kept.`
struct AccountCleanup {
    re: Regex,
}

impl Classifier for AccountCleanup {
    fn kind(&self) -> EventKind {
        EventKind::AccountCleanup
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(accounts_kept) = self
            .re
            .captures(text)
            .and_then(|caps| number(&caps, "kept"))
        else {
            return false;
        };
        state.world.cleanups.push(CleanupEvent {
            timestamp,
            accounts_kept,
        });
        true
    }
}

/// `# Server: <Old> is now known as <New>.`
struct Rename {
    re: Regex,
}

impl Classifier for Rename {
    fn kind(&self) -> EventKind {
        EventKind::Rename
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        let Some(caps) = self.re.captures(text) else {
            return false;
        };
        let (Some(old), Some(new)) = (caps.name("old"), caps.name("new")) else {
            return false;
        };
        state.rename_player(old.as_str(), new.as_str(), timestamp);
        true
    }
}

/// `# Server: Server started.`, `Server shutting down.`, `Server restarting.`
struct ServerLifecycle {
    re: Regex,
}

impl Classifier for ServerLifecycle {
    fn kind(&self) -> EventKind {
        EventKind::ServerLifecycle
    }

    fn marker(&self) -> &'static str {
        SERVER_MARKER
    }

    fn try_match(&self, state: &mut LogState, text: &str, timestamp: DateTime<Utc>) -> bool {
        if !self.re.is_match(text) {
            return false;
        }
        state.force_close_all(timestamp);
        true
    }
}

/// Priority-ordered list of classifiers.
pub struct ClassifierSet {
    classifiers: Vec<Box<dyn Classifier>>,
}

impl std::fmt::Debug for ClassifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.classifiers.iter().map(|c| c.kind()))
            .finish()
    }
}

impl ClassifierSet {
    /// Builds the standard set, compiling every pattern once.
    pub fn standard() -> Result<Self, regex::Error> {
        let messages = MobMessages::new()?;
        let classifiers: Vec<Box<dyn Classifier>> = vec![
            Box::new(Chat {
                re: Regex::new(CHAT_NAME)?,
            }),
            Box::new(Join {
                re: Regex::new(&format!(r"^\*\*\* {NAME} joined the game\.$"))?,
            }),
            Box::new(Leave {
                re: Regex::new(&format!(r"^\*\*\* {NAME} left the game\."))?,
            }),
            Box::new(PlayerCounter {
                kind: EventKind::Soliloquy,
                marker: EMOTE_MARKER,
                re: Regex::new(&format!(r"^\* {NAME}(?: |$)"))?,
                creates_player: false,
                counter: n_soliloquies,
            }),
            Box::new(PlaneShift {
                re: server(&format!(r"{NAME} has plane shifted to (?P<plane>.+)\."))?,
            }),
            Box::new(MapgenBlame {
                re: server(&format!(
                    r"Mapgen scrambling\. Blame {NAME} for lag\. Chunks: (?P<chunks>\d+)\."
                ))?,
            }),
            Box::new(MapgenAnonymous {
                re: server(r"Mapgen working, expect lag\. \(Chunks: (?P<chunks>\d+)\.\)")?,
            }),
            Box::new(PlayerDeath {
                messages: messages.clone(),
            }),
            Box::new(MobKill { messages }),
            Box::new(PlayerCounter {
                kind: EventKind::Suicide,
                marker: SERVER_MARKER,
                re: server(&format!(r"{NAME} committed suicide\."))?,
                creates_player: true,
                counter: n_suicides,
            }),
            Box::new(PlayerCounter {
                kind: EventKind::Kick,
                marker: SERVER_MARKER,
                re: server(&format!(r"{NAME} was kicked\."))?,
                creates_player: false,
                counter: n_kicks,
            }),
            Box::new(PlayerCounter {
                kind: EventKind::DuctTape,
                marker: SERVER_MARKER,
                re: server(&format!(r"{NAME} has been duct-taped\."))?,
                creates_player: false,
                counter: n_duct_tapes,
            }),
            Box::new(PlayerCounter {
                kind: EventKind::Mark,
                marker: SERVER_MARKER,
                re: server(&format!(r"{NAME} has been marked\."))?,
                creates_player: false,
                counter: n_marks,
            }),
            Box::new(AccountCleanup {
                re: server(r"Account cleanup complete\. (?P<kept>\d+) accounts kept\.")?,
            }),
            Box::new(Rename {
                re: server(r"<(?P<old>[^<>]+)> is now known as <(?P<new>[^<>]+)>\.")?,
            }),
            Box::new(ServerLifecycle {
                re: server(r"Server (?:started|shutting down|restarting)\.")?,
            }),
        ];
        Ok(Self { classifiers })
    }

    /// Kinds in the order they are tried.
    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.classifiers.iter().map(|c| c.kind())
    }

    /// Runs the classifiers in priority order; returns the kind that matched.
    pub fn classify(
        &self,
        state: &mut LogState,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<EventKind> {
        self.classifiers
            .iter()
            .filter(|c| text.starts_with(c.marker()))
            .find(|c| c.try_match(state, text, timestamp))
            .map(|c| c.kind())
    }
}
