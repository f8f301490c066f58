//! Turns generated text into a publishable HTML document.
//!
//! Input is lightweight markdown: an optional `# ` title line, `## ` / `### `
//! section headers and blank-line separated paragraphs. Everything here is
//! deterministic; the same input and options always produce the same document
//! and the same SEO score.

use std::sync::LazyLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::Formatter;
use crate::error::FormatError;
use crate::request::{BacklinkPosition, FormattingOptions};

const WORDS_PER_MINUTE: usize = 200;
const META_DESCRIPTION_LEN: usize = 155;
const SLUG_MAX_LEN: usize = 60;

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("heading pattern is valid")
});

/// Everything the formatter needs about one domain's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatInput {
    pub raw_text: String,
    pub keyword: String,
    pub anchor_text: String,
    pub target_url: String,
    pub template_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedDocument {
    pub title: String,
    pub slug: String,
    pub html: String,
    pub excerpt: String,
    pub meta_description: String,
    pub word_count: usize,
    pub reading_time_minutes: usize,
    pub seo_score: u8,
    /// The href currently carried by the backlink anchor.
    pub backlink_href: String,
}

impl FormattedDocument {
    /// Points the backlink at `href`, e.g. the final tracked URL.
    pub fn retarget_backlink(&mut self, href: &str) {
        let old = backlink_attr(&self.backlink_href);
        let new = backlink_attr(href);
        self.html = self.html.replace(&old, &new);
        self.backlink_href = href.to_string();
    }
}

fn backlink_attr(href: &str) -> String {
    format!(
        "href=\"{}\" class=\"content-backlink\"",
        encode_double_quoted_attribute(href)
    )
}

/// Default [`Formatter`].
#[derive(Debug, Clone, Default)]
pub struct ContentFormatter;

impl Formatter for ContentFormatter {
    fn format(
        &self,
        input: &FormatInput,
        options: &FormattingOptions,
    ) -> Result<FormattedDocument, FormatError> {
        format_document(input, options)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Inline {
    Text(String),
    Backlink { lead: String, trail: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Heading { level: u8, text: String },
    Paragraph(Vec<Inline>),
}

struct Parsed {
    title: Option<String>,
    blocks: Vec<Block>,
}

pub fn format_document(
    input: &FormatInput,
    options: &FormattingOptions,
) -> Result<FormattedDocument, FormatError> {
    let Parsed { title, mut blocks } = parse(&input.raw_text);
    if !blocks.iter().any(|b| matches!(b, Block::Paragraph(_))) {
        return Err(FormatError::EmptyContent);
    }
    let title = title.unwrap_or_else(|| format!("The Complete Guide to {}", input.keyword));

    if options.optimize_for_seo {
        ensure_keyword_lead(&mut blocks, &input.keyword);
    }
    insert_backlink(&mut blocks, options.backlink_position, &input.keyword);

    let keyword_re = RegexBuilder::new(&regex::escape(input.keyword.trim()))
        .case_insensitive(true)
        .build()
        .map_err(|e| FormatError::Other(e.to_string()))?;

    let body_text = plain_text(&blocks, &input.anchor_text);
    let word_count = count_words(&body_text);
    let excerpt = if options.generate_excerpt {
        excerpt_of(&paragraph_text(&blocks, &input.anchor_text))
    } else {
        String::new()
    };
    let meta_source = if excerpt.is_empty() { &body_text } else { &excerpt };
    let meta_description = truncate_chars(meta_source, META_DESCRIPTION_LEN);

    let seo_score = score(&Scoring {
        title: &title,
        first_paragraph: &first_paragraph_text(&blocks, &input.anchor_text),
        body_text: &body_text,
        excerpt: &excerpt,
        headings: blocks
            .iter()
            .filter(|b| matches!(b, Block::Heading { .. }))
            .count(),
        word_count,
        keyword: &keyword_re,
    });

    let html = render(&title, &blocks, input, options);
    let slug = slugify(&title);
    debug!(
        template_id = %input.template_id,
        slug = %slug,
        word_count,
        seo_score,
        "Document formatted"
    );

    Ok(FormattedDocument {
        title,
        slug,
        html,
        excerpt,
        meta_description,
        word_count,
        reading_time_minutes: word_count.div_ceil(WORDS_PER_MINUTE),
        seo_score,
        backlink_href: input.target_url.clone(),
    })
}

fn parse(raw: &str) -> Parsed {
    let mut title = None;
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut current, &mut blocks);
            continue;
        }
        if let Some(caps) = HEADING.captures(line) {
            flush(&mut current, &mut blocks);
            let level = caps[1].len();
            let text = caps[2].to_string();
            if level == 1 && title.is_none() {
                title = Some(text);
            } else {
                blocks.push(Block::Heading {
                    level: level.clamp(2, 3) as u8,
                    text,
                });
            }
            continue;
        }
        current.push(line);
    }
    flush(&mut current, &mut blocks);
    Parsed { title, blocks }
}

fn flush(current: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if !current.is_empty() {
        blocks.push(Block::Paragraph(vec![Inline::Text(current.join(" "))]));
        current.clear();
    }
}

fn ensure_keyword_lead(blocks: &mut [Block], keyword: &str) {
    let Some(Block::Paragraph(inlines)) = blocks
        .iter_mut()
        .find(|b| matches!(b, Block::Paragraph(_)))
    else {
        return;
    };
    let present = inlines.iter().any(|i| match i {
        Inline::Text(t) => t.to_lowercase().contains(&keyword.to_lowercase()),
        Inline::Backlink { .. } => false,
    });
    if !present {
        inlines.insert(
            0,
            Inline::Text(format!(
                "When it comes to {keyword}, understanding the fundamentals is crucial. "
            )),
        );
    }
}

fn insert_backlink(blocks: &mut Vec<Block>, position: BacklinkPosition, keyword: &str) {
    match position {
        BacklinkPosition::Start => {
            if let Some(Block::Paragraph(inlines)) = blocks
                .iter_mut()
                .find(|b| matches!(b, Block::Paragraph(_)))
            {
                inlines.insert(
                    0,
                    Inline::Backlink {
                        lead: "Start with ".into(),
                        trail: ". ".into(),
                    },
                );
            }
        }
        BacklinkPosition::End => blocks.push(Block::Paragraph(vec![Inline::Backlink {
            lead: format!("For more information about {keyword}, visit "),
            trail: ".".into(),
        }])),
        BacklinkPosition::Natural => insert_natural(blocks),
    }
}

/// Places the link after the first sentence boundary at or past the midpoint
/// of the paragraph text, counted in characters.
fn insert_natural(blocks: &mut [Block]) {
    let total: usize = blocks.iter().map(paragraph_chars).sum();
    let mid = total / 2;
    let mut offset = 0;
    for block in blocks.iter_mut() {
        let Block::Paragraph(inlines) = block else {
            continue;
        };
        let mut split = None;
        for (idx, inline) in inlines.iter().enumerate() {
            let Inline::Text(text) = inline else {
                continue;
            };
            let len = text.chars().count();
            if let Some(byte) = boundary_at_or_after(text, offset, mid) {
                split = Some((idx, byte));
                break;
            }
            offset += len;
        }
        if let Some((idx, byte)) = split {
            let Inline::Text(text) = inlines[idx].clone() else {
                return;
            };
            let (before, after) = text.split_at(byte);
            let link = Inline::Backlink {
                lead: " For more on this topic, see ".into(),
                trail: ".".into(),
            };
            let mut replacement = vec![Inline::Text(before.to_string()), link];
            if !after.is_empty() {
                replacement.push(Inline::Text(after.to_string()));
            }
            inlines.splice(idx..=idx, replacement);
            return;
        }
    }
}

fn boundary_at_or_after(text: &str, offset: usize, mid: usize) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (i, &(byte, c)) in chars.iter().enumerate() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.get(i + 1).map_or(true, |(_, n)| n.is_whitespace());
            if at_break && offset + i + 1 >= mid {
                return Some(byte + c.len_utf8());
            }
        }
    }
    // end of a paragraph is a boundary too
    if offset + chars.len() >= mid {
        Some(text.len())
    } else {
        None
    }
}

fn paragraph_chars(block: &Block) -> usize {
    match block {
        Block::Paragraph(inlines) => inlines
            .iter()
            .map(|i| match i {
                Inline::Text(t) => t.chars().count(),
                Inline::Backlink { .. } => 0,
            })
            .sum(),
        Block::Heading { .. } => 0,
    }
}

fn inline_text(inlines: &[Inline], anchor: &str) -> String {
    inlines
        .iter()
        .map(|i| match i {
            Inline::Text(t) => t.clone(),
            Inline::Backlink { lead, trail } => format!("{lead}{anchor}{trail}"),
        })
        .collect()
}

fn plain_text(blocks: &[Block], anchor: &str) -> String {
    blocks
        .iter()
        .map(|b| match b {
            Block::Heading { text, .. } => text.clone(),
            Block::Paragraph(inlines) => inline_text(inlines, anchor),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn paragraph_text(blocks: &[Block], anchor: &str) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Paragraph(inlines) => Some(inline_text(inlines, anchor)),
            Block::Heading { .. } => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_paragraph_text(blocks: &[Block], anchor: &str) -> String {
    blocks
        .iter()
        .find_map(|b| match b {
            Block::Paragraph(inlines) => Some(inline_text(inlines, anchor)),
            Block::Heading { .. } => None,
        })
        .unwrap_or_default()
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn excerpt_of(text: &str) -> String {
    let sentences: Vec<&str> = text.split(". ").collect();
    let mut excerpt = sentences
        .iter()
        .take(2)
        .copied()
        .collect::<Vec<_>>()
        .join(". ");
    if sentences.len() > 2 {
        excerpt.push_str("...");
    }
    excerpt.trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Lowercase ASCII slug: alphanumerics separated by single hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let mut slug = slug.trim_end_matches('-').to_string();
    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
        if let Some(cut) = slug.rfind('-') {
            slug.truncate(cut);
        }
    }
    slug
}

struct Scoring<'a> {
    title: &'a str,
    first_paragraph: &'a str,
    body_text: &'a str,
    excerpt: &'a str,
    headings: usize,
    word_count: usize,
    keyword: &'a Regex,
}

/// 0–100. Keyword in title (20), in first paragraph (15), density within
/// 0.5%–2.5% (25, or 10 when present but outside), heading density (20, or 10
/// with a single header), keyword in excerpt (10), at least 300 words (10).
fn score(s: &Scoring<'_>) -> u8 {
    let mut total = 0u8;
    if s.keyword.is_match(s.title) {
        total += 20;
    }
    if s.keyword.is_match(s.first_paragraph) {
        total += 15;
    }
    let occurrences = s.keyword.find_iter(s.body_text).count();
    if s.word_count > 0 && occurrences > 0 {
        let density = occurrences as f64 / s.word_count as f64 * 100.0;
        total += if (0.5..=2.5).contains(&density) { 25 } else { 10 };
    }
    if s.headings >= 2 && s.headings * 300 >= s.word_count {
        total += 20;
    } else if s.headings >= 1 {
        total += 10;
    }
    if !s.excerpt.is_empty() && s.keyword.is_match(s.excerpt) {
        total += 10;
    }
    if s.word_count >= 300 {
        total += 10;
    }
    total.min(100)
}

fn render(title: &str, blocks: &[Block], input: &FormatInput, options: &FormattingOptions) -> String {
    let class = encode_double_quoted_attribute(&input.template_id).to_string();
    let headings: Vec<(usize, u8, &str)> = blocks
        .iter()
        .filter_map(|b| match b {
            Block::Heading { level, text } => Some((*level, text.as_str())),
            Block::Paragraph(_) => None,
        })
        .enumerate()
        .map(|(i, (level, text))| (i + 1, level, text))
        .collect();
    let with_toc = options.include_table_of_contents && headings.len() >= 2;

    let mut html = String::new();
    if options.optimize_for_seo {
        html.push_str("<article itemscope itemtype=\"https://schema.org/Article\">\n");
    } else {
        html.push_str("<article>\n");
    }
    html.push_str(&format!(
        "<h1 class=\"tpl-{class}-title\">{}</h1>\n",
        encode_text(title)
    ));

    if with_toc {
        html.push_str("<nav class=\"table-of-contents\">\n<ul class=\"toc-list\">\n");
        for (n, level, text) in &headings {
            let item_class = if *level == 2 { "toc-main" } else { "toc-sub" };
            html.push_str(&format!(
                "<li class=\"{item_class}\"><a href=\"#section-{n}\">{}</a></li>\n",
                encode_text(text)
            ));
        }
        html.push_str("</ul>\n</nav>\n");
    }

    let mut heading_no = 0;
    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                heading_no += 1;
                let kind = if *level == 2 { "heading" } else { "subheading" };
                let id = if with_toc {
                    format!(" id=\"section-{heading_no}\"")
                } else {
                    String::new()
                };
                html.push_str(&format!(
                    "<h{level} class=\"tpl-{class}-{kind}\"{id}>{}</h{level}>\n",
                    encode_text(text)
                ));
            }
            Block::Paragraph(inlines) => {
                html.push_str(&format!("<p class=\"tpl-{class}-paragraph\">"));
                for inline in inlines {
                    match inline {
                        Inline::Text(t) => html.push_str(&encode_text(t)),
                        Inline::Backlink { lead, trail } => {
                            html.push_str(&encode_text(lead));
                            html.push_str(&format!(
                                "<a {} rel=\"noopener\">{}</a>",
                                backlink_attr(&input.target_url),
                                encode_text(&input.anchor_text)
                            ));
                            html.push_str(&encode_text(trail));
                        }
                    }
                }
                html.push_str("</p>\n");
            }
        }
    }
    html.push_str("</article>\n");
    html
}
