use std::sync::LazyLock;

use anyhow::bail;
use regex::Regex;

/// Release junk that must never end up in a show title.
const NAME_NOISE: &[&str] = &[
    "3d", "4k", "480i", "480p", "576i", "576p", "720i", "720p", "1080i", "1080p", "2160p", "aac",
    "ac3", "bdrip", "bluray", "blu-ray", "brrip", "dc", "divx", "dl", "dsr", "dts", "dubbed",
    "dvd", "dvdrip", "dvdscr", "h264", "h265", "hdr", "hdrip", "hdtv", "hdtvrip", "hevc",
    "internal", "multi", "ntsc", "pdtv", "proper", "remux", "repack", "rerip", "sbs", "svcd",
    "uhd", "unrated", "webdl", "web-dl", "webrip", "x264", "x265", "xvid",
];

pub const OPEN_BRACKETS: [char; 3] = ['(', '[', '{'];
pub const CLOSE_BRACKETS: [char; 3] = [')', ']', '}'];
pub const SEPARATORS: [char; 4] = ['-', '_', ' ', '.'];

#[derive(Debug, PartialEq, Eq)]
pub enum Token<'a> {
    /// Anything that is not noise, a year or a separator. It "may" be part of the show title
    Unknown(&'a str),
    /// An element of [NAME_NOISE]
    Noise(&'a str),
    /// 4 digit token that "may" represent the release year
    Year(u16),
    GroupStart,
    GroupEnd,
}

fn classify(word: &str, current_year: u16) -> Token<'_> {
    if word.len() == 4 && word.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(year) = word.parse::<u16>() {
            if (1900..=current_year).contains(&year) {
                return Token::Year(year);
            }
        }
    }
    if NAME_NOISE.iter().any(|n| word.eq_ignore_ascii_case(n)) {
        return Token::Noise(word);
    }
    Token::Unknown(word)
}

/// Splits a file stem or directory name into tokens. Separators are dropped,
/// bracket pairs become group markers.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let current_year = time::OffsetDateTime::now_utc().year() as u16;
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, char) in input.char_indices() {
        if SEPARATORS.contains(&char)
            || OPEN_BRACKETS.contains(&char)
            || CLOSE_BRACKETS.contains(&char)
        {
            if let Some(s) = start.take() {
                tokens.push(classify(&input[s..i], current_year));
            }
            if OPEN_BRACKETS.contains(&char) {
                tokens.push(Token::GroupStart);
            } else if CLOSE_BRACKETS.contains(&char) {
                tokens.push(Token::GroupEnd);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(classify(&input[s..], current_year));
    }
    tokens
}

static STANDARD_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^a-z0-9])s(?:eason)?[\s._-]{0,2}(\d{1,2})[\s._-]{0,2}(?:e(?:pisode)?|x)[\s._-]{0,2}(\d{1,3})",
    )
    .expect("pattern to compile")
});

static FLEXIBLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})").expect("pattern to compile")
});

static SEASON_FOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:season|series|s)[\s._-]{0,2}(\d{1,2})").expect("pattern to compile")
});

/// Season/episode numbers recognized in a single file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeTag {
    pub season: u16,
    pub episodes: Vec<u16>,
    /// Byte offset of the first tag. Text before it may contain the show title
    pub offset: usize,
}

/// Reads episode numbers chained onto a matched tag, like the `E02` in
/// `S01E01E02` or the `-03` in `S01E01-03`. A digit run longer than two is
/// release junk (`-1080p`), not an episode list, and ends the chain.
fn chained_episodes(rest: &str, episodes: &mut Vec<u16>) {
    let mut chars = rest.char_indices().peekable();
    loop {
        let mut saw_marker = false;
        if let Some((_, '-')) = chars.peek() {
            chars.next();
            saw_marker = true;
        }
        match chars.peek() {
            Some((i, 'e' | 'E')) => {
                let i = *i;
                chars.next();
                if rest
                    .get(i..i + "episode".len())
                    .is_some_and(|s| s.eq_ignore_ascii_case("episode"))
                {
                    for _ in 0.."pisode".len() {
                        chars.next();
                    }
                }
                saw_marker = true;
            }
            Some((_, 'x' | 'X')) => {
                chars.next();
                saw_marker = true;
            }
            _ => {}
        }
        if !saw_marker {
            return;
        }
        let mut digits = String::new();
        while let Some((_, c)) = chars.peek() {
            if c.is_ascii_digit() {
                digits.push(*c);
                chars.next();
            } else {
                break;
            }
        }
        if digits.is_empty() || digits.len() > 2 {
            return;
        }
        match digits.parse() {
            Ok(num) => episodes.push(num),
            Err(_) => return,
        }
    }
}

/// Extracts season and episode numbers from a file stem.
///
/// Recognizes `S01E02`, `s1 e2`, `Season 1 Episode 2`, `1x02` and the
/// multi-episode forms `S01E01E02`, `S01E01-03` and `1x01 & 1x02`. Repeated
/// tags naming different seasons are an error, equal episode numbers collapse
/// to one.
pub fn extract_episode_tag(stem: &str) -> anyhow::Result<Option<EpisodeTag>> {
    let mut found: Vec<(usize, u16, Vec<u16>)> = Vec::new();
    for pattern in [&STANDARD_TAG, &FLEXIBLE_TAG] {
        for caps in pattern.captures_iter(stem) {
            let season = caps[1].parse()?;
            let episode_group = caps.get(2).expect("group 2 is not optional");
            let mut episodes = vec![episode_group.as_str().parse()?];
            chained_episodes(&stem[episode_group.end()..], &mut episodes);
            let whole = caps.get(0).expect("group 0 always exists");
            found.push((whole.start(), season, episodes));
        }
        if !found.is_empty() {
            break;
        }
    }
    let Some((offset, season, _)) = found.first().cloned() else {
        return Ok(None);
    };
    if found.iter().any(|(_, s, _)| *s != season) {
        bail!("multiple seasons in one file name: {stem}");
    }
    let mut episodes = Vec::new();
    for num in found.into_iter().flat_map(|(_, _, eps)| eps) {
        if !episodes.contains(&num) {
            episodes.push(num);
        }
    }
    Ok(Some(EpisodeTag {
        season,
        episodes,
        offset,
    }))
}

fn season_folder_number(dir_name: &str) -> Option<u16> {
    SEASON_FOLDER
        .captures(dir_name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Incrementally built identifier. Directory names feed it on the way down,
/// the file stem completes it.
#[derive(Debug, Default, Clone)]
pub struct ShowIdent {
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episodes: Vec<u16>,
}

impl ShowIdent {
    /// Folders named like `Season 2` contribute a season and nothing else,
    /// any other folder name replaces the title candidate.
    pub fn parse_parent(&mut self, dir_name: &str) {
        if let Some(season) = season_folder_number(dir_name) {
            self.season = Some(season);
            return;
        }
        self.absorb_title(dir_name);
    }

    /// Applies the file stem: episode tag plus whatever title/year precedes it.
    pub fn parse_name(&mut self, stem: &str) -> anyhow::Result<()> {
        let Some(tag) = extract_episode_tag(stem)? else {
            return Ok(());
        };
        self.season = Some(tag.season);
        self.absorb_title(&stem[..tag.offset]);
        self.episodes = tag.episodes;
        Ok(())
    }

    fn absorb_title(&mut self, text: &str) {
        let mut words = Vec::new();
        let mut group_depth = 0usize;
        for token in tokenize(text) {
            match token {
                Token::GroupStart => group_depth += 1,
                Token::GroupEnd => group_depth = group_depth.saturating_sub(1),
                Token::Year(year) => self.year = Some(year),
                Token::Unknown(word) if group_depth == 0 => words.push(word),
                _ => {}
            }
        }
        if !words.is_empty() {
            self.title = words.join(" ");
        }
    }
}

/// Fully identified episode file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowIdentifier {
    pub title: String,
    pub season: u16,
    pub episodes: Vec<u16>,
    pub year: Option<u16>,
}

impl TryFrom<ShowIdent> for ShowIdentifier {
    type Error = ShowIdent;

    fn try_from(ident: ShowIdent) -> Result<Self, Self::Error> {
        let Some(season) = ident.season else {
            return Err(ident);
        };
        if ident.title.is_empty() || ident.episodes.is_empty() {
            return Err(ident);
        }
        Ok(ShowIdentifier {
            title: ident.title,
            season,
            episodes: ident.episodes,
            year: ident.year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize_test<'a>(tests: impl IntoIterator<Item = (&'a str, Vec<Token<'a>>)>) {
        for (test, expected) in tests {
            assert_eq!(expected, tokenize(test), "input: {test}");
        }
    }

    #[test]
    fn tokenize_shows() {
        let tests = [
            (
                "Cyberpunk.Edgerunners.S01E02.DUBBED.1080p.WEBRip.x265-RARBG[eztv.re]",
                vec![
                    Token::Unknown("Cyberpunk"),
                    Token::Unknown("Edgerunners"),
                    Token::Unknown("S01E02"),
                    Token::Noise("DUBBED"),
                    Token::Noise("1080p"),
                    Token::Noise("WEBRip"),
                    Token::Noise("x265"),
                    Token::Unknown("RARBG"),
                    Token::GroupStart,
                    Token::Unknown("eztv"),
                    Token::Unknown("re"),
                    Token::GroupEnd,
                ],
            ),
            (
                "shogun.2024.s01e05.2160p.web.h265-successfulcrab",
                vec![
                    Token::Unknown("shogun"),
                    Token::Year(2024),
                    Token::Unknown("s01e05"),
                    Token::Noise("2160p"),
                    Token::Unknown("web"),
                    Token::Noise("h265"),
                    Token::Unknown("successfulcrab"),
                ],
            ),
            (
                "Foo (2019).S04E03",
                vec![
                    Token::Unknown("Foo"),
                    Token::GroupStart,
                    Token::Year(2019),
                    Token::GroupEnd,
                    Token::Unknown("S04E03"),
                ],
            ),
        ];
        tokenize_test(tests);
    }

    fn tag(stem: &str) -> EpisodeTag {
        extract_episode_tag(stem)
            .expect("no season conflict")
            .unwrap_or_else(|| panic!("expected a tag in {stem}"))
    }

    #[test]
    fn single_episode_tags() {
        assert_eq!(tag("Breaking.Bad.S01E02").season, 1);
        assert_eq!(tag("Breaking.Bad.S01E02").episodes, vec![2]);
        assert_eq!(tag("show s1 e9").episodes, vec![9]);
        assert_eq!(tag("Season 3 Episode 7").season, 3);
        assert_eq!(tag("Season 3 Episode 7").episodes, vec![7]);
        assert_eq!(tag("the-office-2x05").season, 2);
        assert_eq!(tag("the-office-2x05").episodes, vec![5]);
        assert_eq!(tag("Show.S02E103").episodes, vec![103]);
    }

    #[test]
    fn multi_episode_tags() {
        assert_eq!(tag("Show.S02E01E02").episodes, vec![1, 2]);
        assert_eq!(tag("Show.S02E01-03").episodes, vec![1, 3]);
        assert_eq!(tag("Show.S02E01-E03").episodes, vec![1, 3]);
        assert_eq!(tag("1x01 & 1x02 & 1x03").episodes, vec![1, 2, 3]);
        assert_eq!(tag("Show S01E04 S01E05").episodes, vec![4, 5]);
    }

    #[test]
    fn repeated_tags_collapse() {
        assert_eq!(tag("Show.S01E05.S01E05").episodes, vec![5]);
    }

    #[test]
    fn mixed_seasons_is_an_error() {
        assert!(extract_episode_tag("Show S01E01 & S02E01").is_err());
    }

    #[test]
    fn release_junk_is_not_an_episode_list() {
        assert_eq!(tag("Show.S01E01.x264").episodes, vec![1]);
        assert_eq!(tag("Show S01E01 - 1080p").episodes, vec![1]);
        assert_eq!(tag("Show.S01E01-1080p").episodes, vec![1]);
    }

    #[test]
    fn resolution_is_not_a_tag() {
        assert_eq!(extract_episode_tag("film.1920x1080.sample").unwrap(), None);
        assert_eq!(extract_episode_tag("plain movie (2010)").unwrap(), None);
    }

    #[test]
    fn season_folders() {
        assert_eq!(season_folder_number("Season 2"), Some(2));
        assert_eq!(season_folder_number("series.04"), Some(4));
        assert_eq!(season_folder_number("S10"), Some(10));
        assert_eq!(season_folder_number("Scrubs"), None);
        assert_eq!(season_folder_number("Silicon Valley"), None);
    }

    #[test]
    fn ident_from_folders_and_stem() {
        let mut ident = ShowIdent::default();
        ident.parse_parent("The Sopranos (1999)");
        ident.parse_parent("Season 2");
        ident.parse_name("2x05").expect("single season");
        let identifier = ShowIdentifier::try_from(ident).expect("complete identifier");
        assert_eq!(identifier.title, "The Sopranos");
        assert_eq!(identifier.year, Some(1999));
        assert_eq!(identifier.season, 2);
        assert_eq!(identifier.episodes, vec![5]);
    }

    #[test]
    fn stem_title_wins_over_folder() {
        let mut ident = ShowIdent::default();
        ident.parse_parent("downloads");
        ident
            .parse_name("Severance.S02E07.1080p.WEBRip")
            .expect("single season");
        let identifier = ShowIdentifier::try_from(ident).expect("complete identifier");
        assert_eq!(identifier.title, "Severance");
        assert_eq!(identifier.season, 2);
    }

    #[test]
    fn no_tag_keeps_folder_context() {
        let mut ident = ShowIdent::default();
        ident.parse_parent("Mr Robot");
        ident.parse_name("behind the scenes").expect("no tag");
        assert!(ShowIdentifier::try_from(ident).is_err());
    }
}
