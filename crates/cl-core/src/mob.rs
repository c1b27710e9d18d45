//! Mob name extraction from death broadcasts.
//!
//! The server announces deaths with randomized sentences. Two shapes exist:
//!
//! - a player killed by a mob:
//!   `<Alice> was viciously wasted by an irascible Black-Hearted Oerkki.`
//! - a mob killed by a player, drawn from a list of murder templates:
//!   `A displeased <Sanith> ruthlessly scrubbed a Flying Menace.`
//!
//! Templates use placeholders that expand to closed vocabularies. Each
//! template is compiled once into an anchored regex; matching walks the list
//! in order and the first hit wins. Overlapping templates are not ranked, so
//! the extracted name is a best-effort normalization.
//!
//! One template never names its victim
//! (`<an_angry_k> has decided <k_his> favorite weapon is <k_his> <w>.`). It
//! still marks the line as a murder broadcast but yields [`Slain::Unnamed`].

use regex::Regex;

const KILL_ADJ: &[&str] = &[
    "killed",
    "slain",
    "slaughtered",
    "mauled",
    "murdered",
    "pwned",
    "owned",
    "dispatched",
    "neutralized",
    "wasted",
    "polished off",
    "rubbed out",
    "snuffed out",
    "assassinated",
    "annulled",
    "destroyed",
    "finished off",
    "terminated",
    "wiped out",
    "scrubbed",
    "abolished",
    "obliterated",
    "voided",
    "ended",
    "annihilated",
    "undone",
    "nullified",
    "exterminated",
];

const KILL_ADJ_PAST: &[&str] = &[
    "killed",
    "slew",
    "slaughtered",
    "mauled",
    "murdered",
    "pwned",
    "owned",
    "dispatched",
    "neutralized",
    "wasted",
    "polished off",
    "rubbed out",
    "snuffed out",
    "assassinated",
    "annulled",
    "destroyed",
    "finished off",
    "terminated",
    "wiped out",
    "scrubbed",
    "abolished",
    "obliterated",
    "voided",
    "ended",
    "annihilated",
    "undid",
    "nullified",
    "exterminated",
];

const KILL_VERB: &[&str] = &[
    "kill",
    "slay",
    "slaughter",
    "maul",
    "murder",
    "pwn",
    "own",
    "dispatch",
    "neutralize",
    "waste",
    "polish off",
    "rub out",
    "snuff out",
    "assassinate",
    "annul",
    "destroy",
    "finish off",
    "terminate",
    "wipe out",
    "scrub",
    "abolish",
    "obliterate",
    "void",
    "end",
    "annihilate",
    "undo",
    "nullify",
    "exterminate",
];

const KILL_ADV: &[&str] = &[
    "brutally",
    "swiftly",
    "savagely",
    "viciously",
    "uncivilly",
    "barbarously",
    "ruthlessly",
    "ferociously",
    "rudely",
    "cruelly",
];

const ANGRY: &[&str] = &[
    "angry",
    "PO'ed",
    "furious",
    "disgusted",
    "infuriated",
    "annoyed",
    "irritated",
    "bitter",
    "offended",
    "outraged",
    "irate",
    "enraged",
    "indignant",
    "irritable",
    "cross",
    "riled",
    "vexed",
    "wrathful",
    "fierce",
    "displeased",
    "irascible",
    "ireful",
    "sulky",
    "ill-tempered",
    "vehement",
    "raging",
    "incensed",
    "frenzied",
    "enthusiastic",
    "fuming",
    "cranky",
    "peevish",
    "belligerent",
];

const PAIN: &[&str] = &["harm", "pain", "grief", "trouble", "evil", "ill will"];

/// Murder broadcasts for a mob slain by a player.
///
/// `<n> <v>` is the victim mob ("a Flying Menace"), `<an_angry_k>` the killing
/// player, `<w>` the weapon.
pub const MURDER_TEMPLATES: &[&str] = &[
    "<n> <v> collapsed from <an_angry_k>'s <angry>attack.",
    "<an_angry_k>'s <w> apparently wasn't such an unusual weapon after all, as <n> <v> found out.",
    "<an_angry_k> <brutally><slew> <n> <v> with great prejudice.",
    "<n> <v> died from <an_angry_k>'s horrid slaying.",
    "<n> <v> fell prey to <an_angry_k>'s deadly <w>.",
    "<an_angry_k> went out of <k_his> way to <slay> <n> <v> with <k_his> <w>.",
    "<n> <v> danced <v_himself> to death under <an_angry_k>'s craftily wielded <w>.",
    "<an_angry_k> used <k_his> <w> to <slay> <n> <v> with prejudice.",
    "<an_angry_k> made a splortching sound with <n> <v>'s head.",
    "<n> <v> was <slain> by <an_angry_k>'s skillfully handled <w>.",
    "<n> <v> became prey for <an_angry_k>.",
    "<n> <v> didn't get out of <an_angry_k>'s way in time.",
    "<n> <v> SAW <an_angry_k> coming with <k_his> <w>. Didn't get away in time.",
    "<n> <v> made no real attempt to get out of <an_angry_k>'s way.",
    "<an_angry_k> barreled through <n> <v> as if <v_he> wasn't there.",
    "<an_angry_k> sent <n> <v> to that place where kindling wood isn't needed.",
    "<n> <v> didn't suspect that <an_angry_k> meant <v_him> any <pain>.",
    "<n> <v> fought <an_angry_k> to the death and lost painfully.",
    "<n> <v> knew <an_angry_k> was wielding <k_his> <w> but didn't guess what <k> meant to do with it.",
    "<an_angry_k> <brutally>clonked <n> <v> over the head using <k_his> <w> with silent skill.",
    "<an_angry_k> made sure <n> <v> didn't see that coming!",
    "<an_angry_k> has decided <k_his> favorite weapon is <k_his> <w>.",
    "<n> <v> did the mad hatter dance just before being <slain> with <an_angry_k>'s <w>.",
    "<n> <v> played the victim to <an_angry_k>'s bully behavior!",
    "<an_angry_k> used <n> <v> for weapons practice with <k_his> <w>.",
    "<n> <v> failed to avoid <an_angry_k>'s oncoming weapon.",
    "<an_angry_k> successfully got <n> <v> to complain of a headache.",
    "<n> <v> got <v_himself> some serious hurt from <an_angry_k>'s <w>.",
    "Trying to talk peace to <an_angry_k> didn't win any for <n> <v>.",
    "<n> <v> was <brutally><slain> by <an_angry_k>'s <w>.",
    "<n> <v> jumped the mad-hatter dance under <an_angry_k>'s <w>.",
    "<n> <v> got <v_himself> a fatal mauling by <an_angry_k>'s <w>.",
    "<an_angry_k> <brutally><slew> <n> <v> with <k_his> <w>.",
    "<an_angry_k> split <n> <v>'s wig.",
    "<an_angry_k> took revenge on <n> <v>.",
    "<an_angry_k> <brutally><slew> <n> <v>.",
    "<n> <v> played dead. Permanently.",
    "<n> <v> never saw what hit <v_him>.",
    "<an_angry_k> took <n> <v> by surprise.",
    "<n> <v> was <brutally><slain>.",
    "<an_angry_k> didn't take any prisoners from <n> <v>.",
    "<an_angry_k> <brutally>pinned <n> <v> to the wall with <k_his> <w>.",
    "<n> <v> failed <v_his> weapon checks.",
    "<k> eliminated <n> <v>.",
];

/// Joins a vocabulary into a non-capturing alternation.
fn alternation(words: &[&str]) -> String {
    let escaped: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    format!("(?:{})", escaped.join("|"))
}

/// Expands one template placeholder into its regex fragment.
fn expand(placeholder: &str) -> Option<String> {
    let fragment = match placeholder {
        "n" => "[Aa]n?".to_string(),
        "v" => "(?P<mob>.+?)".to_string(),
        "k" | "w" => ".+".to_string(),
        "an_angry_k" => format!("(?:[Aa]n? {} )?<[^<>]+>", alternation(ANGRY)),
        "k_his" | "v_his" => "(?:his|her|its)".to_string(),
        "k_himself" | "v_himself" => "(?:himself|herself|itself)".to_string(),
        "v_him" => "him".to_string(),
        "v_he" => "he".to_string(),
        "brutally" => format!("(?:{} )?", alternation(KILL_ADV)),
        "angry" => format!("(?:{} )?", alternation(ANGRY)),
        "slain" => alternation(KILL_ADJ),
        "slew" => alternation(KILL_ADJ_PAST),
        "slay" => alternation(KILL_VERB),
        "pain" => alternation(PAIN),
        _ => return None,
    };
    Some(fragment)
}

/// Compiles a template into an anchored regex.
///
/// Literal text is escaped; unknown `<...>` tokens are kept literally.
pub fn compile_template(template: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("^");
    let mut rest = template;
    while let Some(open) = rest.find('<') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open + 1..];
        match after.find('>').and_then(|close| Some((close, expand(&after[..close])?))) {
            Some((close, fragment)) => {
                pattern.push_str(&fragment);
                rest = &after[close + 1..];
            }
            None => {
                pattern.push_str(&regex::escape("<"));
                rest = after;
            }
        }
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern)
}

/// A player killed by a mob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDeath<'a> {
    pub player: &'a str,
    pub mob: &'a str,
}

/// What a murder broadcast says about its victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slain<'a> {
    Mob(&'a str),
    /// The template has no victim placeholder.
    Unnamed,
}

/// Compiled death broadcast patterns.
#[derive(Debug, Clone)]
pub struct MobMessages {
    player_death: Regex,
    murders: Vec<Regex>,
}

impl MobMessages {
    pub fn new() -> Result<Self, regex::Error> {
        let player_death = Regex::new(&format!(
            r"^<(?P<player>[^<>]+?)(?: \[[^\]]*\])?> was (?:{} )?{} by an? (?:{} )?(?P<mob>.+?)\.$",
            alternation(KILL_ADV),
            alternation(KILL_ADJ),
            alternation(ANGRY),
        ))?;
        let murders = MURDER_TEMPLATES
            .iter()
            .map(|t| compile_template(t))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            player_death,
            murders,
        })
    }

    /// Matches `<player> was <killed> by a <mob>.`
    pub fn player_death<'a>(&self, text: &'a str) -> Option<PlayerDeath<'a>> {
        let caps = self.player_death.captures(text)?;
        Some(PlayerDeath {
            player: caps.name("player")?.as_str(),
            mob: caps.name("mob")?.as_str(),
        })
    }

    /// Recognizes a murder broadcast and extracts the slain mob when the
    /// template names one.
    pub fn slain_mob<'a>(&self, text: &'a str) -> Option<Slain<'a>> {
        let caps = self.murders.iter().find_map(|re| re.captures(text))?;
        Some(match caps.name("mob") {
            Some(mob) => Slain::Mob(mob.as_str()),
            None => Slain::Unnamed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> MobMessages {
        MobMessages::new().unwrap()
    }

    #[test]
    fn every_naming_template_compiles_with_a_mob_group() {
        for template in MURDER_TEMPLATES {
            let re = compile_template(template).unwrap();
            let has_mob = re.capture_names().flatten().any(|n| n == "mob");
            assert_eq!(has_mob, template.contains("<v>"), "mob group in {template}");
        }
    }

    #[test]
    fn only_the_favorite_weapon_template_is_victimless() {
        let victimless: Vec<_> = MURDER_TEMPLATES
            .iter()
            .filter(|t| !t.contains("<v>"))
            .collect();
        assert_eq!(
            victimless,
            [&"<an_angry_k> has decided <k_his> favorite weapon is <k_his> <w>."]
        );
    }

    #[test]
    fn victimless_broadcast_is_recognized_without_a_mob() {
        let m = messages();
        assert_eq!(
            m.slain_mob("An enraged <Sanith> has decided his favorite weapon is his 'Amethyst Sword'."),
            Some(Slain::Unnamed)
        );
    }

    #[test]
    fn template_literals_are_escaped() {
        let re = compile_template("<n> <v> played dead. Permanently.").unwrap();
        assert!(re.is_match("a Wolf played dead. Permanently."));
        assert!(!re.is_match("a Wolf played deadX Permanently."));
    }

    #[test]
    fn player_death_extracts_player_and_mob() {
        let m = messages();
        let death = m
            .player_death("<AyabelleFeu> was viciously wasted by an irascible Black-Hearted Oerkki.")
            .unwrap();
        assert_eq!(death.player, "AyabelleFeu");
        assert_eq!(death.mob, "Black-Hearted Oerkki");
    }

    #[test]
    fn player_death_without_optional_words() {
        let m = messages();
        let death = m.player_death("<Bob> was killed by a Dirt Man.").unwrap();
        assert_eq!(death.mob, "Dirt Man");
    }

    #[test]
    fn player_death_with_multiword_adjectives() {
        let m = messages();
        let death = m
            .player_death("<Bob> was polished off by an ill-tempered Sand Man.")
            .unwrap();
        assert_eq!(death.mob, "Sand Man");
    }

    #[test]
    fn slain_mob_from_short_template() {
        let m = messages();
        assert_eq!(
            m.slain_mob("A displeased <Sanith> ruthlessly scrubbed a Flying Menace."),
            Some(Slain::Mob("Flying Menace"))
        );
    }

    #[test]
    fn slain_mob_stops_before_weapon() {
        let m = messages();
        assert_eq!(
            m.slain_mob("<Sanith> slew a Flying Menace with his 'Amethyst Sword'."),
            Some(Slain::Mob("Flying Menace"))
        );
    }

    #[test]
    fn slain_mob_from_victim_first_template() {
        let m = messages();
        assert_eq!(
            m.slain_mob("A Dungeon Master was brutally slain by <Alice>'s Diamond Sword."),
            Some(Slain::Mob("Dungeon Master"))
        );
        assert_eq!(
            m.slain_mob("an Oerkki played dead. Permanently."),
            Some(Slain::Mob("Oerkki"))
        );
    }

    #[test]
    fn slain_mob_rejects_other_server_lines() {
        let m = messages();
        assert_eq!(m.slain_mob("<Alice> has plane shifted to Caverns."), None);
        assert_eq!(m.slain_mob("Server shutting down."), None);
    }
}
