//! Document Type Definition parsing.
//!
//! Covers the external-subset declarations a validating parser needs:
//! `ELEMENT` (with `EMPTY`, `ANY`, mixed and element content models),
//! `ATTLIST`, internal parameter entities, general entity names and
//! `NOTATION` (accepted and ignored). Element content models are compiled into
//! anchored regexes over the sequence of child names, so matching a model is a
//! single regex test.

use super::error::ValidationError;
use regex::{Captures, Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

const PARAMETER_REFERENCE_PATTERN: &str = r"%([A-Za-z_:][A-Za-z0-9_.:-]*);";
const MAX_ENTITY_DEPTH: usize = 16;
/// Upper bound on text produced by parameter entity expansion, per DTD.
const MAX_EXPANSION_LEN: usize = 1 << 20;
/// Compiled size limit for a single content model matcher.
const CONTENT_MODEL_SIZE_LIMIT: usize = 1 << 20;

/// Cached regex for `%name;` parameter entity references.
static PARAMETER_REFERENCE_REGEX: OnceLock<Regex> = OnceLock::new();

/// How often a content particle may occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    Once,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    fn suffix(self) -> &'static str {
        match self {
            Self::Once => "",
            Self::Optional => "?",
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
        }
    }
}

/// A content particle of an element-content model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Particle {
    Name(String, Occurrence),
    Sequence(Vec<Particle>, Occurrence),
    Choice(Vec<Particle>, Occurrence),
}

impl Particle {
    fn write_pattern(&self, out: &mut String) {
        match self {
            Self::Name(name, occurrence) => {
                out.push_str("(?:");
                out.push_str(&regex::escape(name));
                out.push_str(",)");
                out.push_str(occurrence.suffix());
            }
            Self::Sequence(items, occurrence) | Self::Choice(items, occurrence) => {
                let separator = if matches!(self, Self::Choice(..)) { "|" } else { "" };
                out.push_str("(?:");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(separator);
                    }
                    item.write_pattern(out);
                }
                out.push(')');
                out.push_str(occurrence.suffix());
            }
        }
    }
}

impl fmt::Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name, occurrence) => write!(f, "{name}{}", occurrence.suffix()),
            Self::Sequence(items, occurrence) | Self::Choice(items, occurrence) => {
                let separator = if matches!(self, Self::Choice(..)) { " | " } else { " , " };
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(separator)?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "){}", occurrence.suffix())
            }
        }
    }
}

/// An element-content model with its compiled matcher.
#[derive(Debug, Clone)]
pub struct ContentModel {
    particle: Particle,
    matcher: Regex,
}

impl ContentModel {
    pub fn new(particle: Particle) -> Result<Self, ValidationError> {
        let mut pattern = String::from("^");
        particle.write_pattern(&mut pattern);
        pattern.push('$');
        let matcher = RegexBuilder::new(&pattern)
            .size_limit(CONTENT_MODEL_SIZE_LIMIT)
            .build()
            .map_err(|e| ValidationError::Dtd(format!("content model {particle} is too complex: {e}")))?;
        Ok(Self { particle, matcher })
    }

    /// Whether the given sequence of child element names satisfies the model.
    pub fn matches(&self, children: &[&str]) -> bool {
        let mut sequence = String::new();
        for name in children {
            sequence.push_str(name);
            sequence.push(',');
        }
        self.matcher.is_match(&sequence)
    }
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.particle)
    }
}

/// The content an element is declared to hold.
#[derive(Debug, Clone)]
pub enum ContentSpec {
    Empty,
    Any,
    /// `(#PCDATA)` or `(#PCDATA | a | b)*`: text mixed with the listed elements
    Mixed(Vec<String>),
    Children(ContentModel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeDefault {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: String,
    pub kind: AttributeType,
    pub default: AttributeDefault,
}

/// A parsed DTD.
#[derive(Debug, Clone, Default)]
pub struct Dtd {
    elements: HashMap<String, ContentSpec>,
    attributes: HashMap<String, Vec<AttributeDecl>>,
    entities: HashSet<String>,
}

impl Dtd {
    /// Parses the text of an external DTD subset.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Dtd` for malformed declarations, redeclared
    /// elements, undefined or runaway parameter entities, parameter entity
    /// expansion beyond 1 MiB in total, external parameter entities and
    /// conditional sections.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let mut builder = DtdBuilder::default();
        builder.parse_subset(text.trim_start_matches('\u{feff}'), 0)?;
        Ok(builder.dtd)
    }

    pub fn element(&self, name: &str) -> Option<&ContentSpec> {
        self.elements.get(name)
    }

    pub fn attributes_of(&self, element: &str) -> &[AttributeDecl] {
        self.attributes
            .get(element)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains(name)
    }
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-') || !c.is_ascii()
}

/// A valid XML `Name`: name characters, not starting with a digit, `.` or `-`.
pub(crate) fn is_name(value: &str) -> bool {
    match value.chars().next() {
        Some(first) if !first.is_ascii_digit() && first != '.' && first != '-' => {
            value.chars().all(is_name_char)
        }
        _ => false,
    }
}

/// A valid XML `Nmtoken`: one or more name characters.
pub(crate) fn is_nmtoken(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_name_char)
}

#[derive(Default)]
struct DtdBuilder {
    dtd: Dtd,
    parameter_entities: HashMap<String, String>,
    /// Bytes produced by parameter entity expansion so far.
    expanded_len: usize,
}

impl DtdBuilder {
    fn charge_expansion(&mut self, len: usize) -> Result<(), ValidationError> {
        self.expanded_len = self.expanded_len.saturating_add(len);
        if self.expanded_len > MAX_EXPANSION_LEN {
            return Err(expansion_too_large());
        }
        Ok(())
    }

    fn parse_subset(&mut self, text: &str, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_ENTITY_DEPTH {
            return Err(dtd_error("parameter entity nesting is too deep"));
        }

        let mut rest = text;
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                return Ok(());
            }

            if let Some(after) = rest.strip_prefix("<!--") {
                let end = after
                    .find("-->")
                    .ok_or_else(|| dtd_error("unterminated comment"))?;
                rest = &after[end + 3..];
            } else if let Some(after) = rest.strip_prefix("<?") {
                let end = after
                    .find("?>")
                    .ok_or_else(|| dtd_error("unterminated processing instruction"))?;
                rest = &after[end + 2..];
            } else if rest.starts_with("<![") {
                return Err(dtd_error("conditional sections are not supported"));
            } else if let Some(after) = rest.strip_prefix("<!") {
                let end = declaration_end(after)
                    .ok_or_else(|| dtd_error(format!("unterminated declaration <!{}", snippet(after))))?;
                self.declaration(&after[..end])?;
                rest = &after[end + 1..];
            } else if let Some(after) = rest.strip_prefix('%') {
                let end = after
                    .find(';')
                    .ok_or_else(|| dtd_error(format!("unterminated reference %{}", snippet(after))))?;
                let name = &after[..end];
                let value = self
                    .parameter_entities
                    .get(name)
                    .cloned()
                    .ok_or_else(|| dtd_error(format!("undefined parameter entity %{name};")))?;
                self.charge_expansion(value.len())?;
                self.parse_subset(&value, depth + 1)?;
                rest = &after[end + 1..];
            } else {
                return Err(dtd_error(format!("unexpected content: {}", snippet(rest))));
            }
        }
    }

    fn declaration(&mut self, raw: &str) -> Result<(), ValidationError> {
        let expanded = self.expand_references(raw)?;
        if expanded != raw {
            self.charge_expansion(expanded.len())?;
        }
        let (keyword, body) = expanded
            .split_once(|c: char| c.is_whitespace())
            .ok_or_else(|| dtd_error(format!("incomplete declaration <!{expanded}>")))?;

        match keyword {
            "ELEMENT" => self.element_declaration(body),
            "ATTLIST" => self.attlist_declaration(body),
            "ENTITY" => self.entity_declaration(body),
            "NOTATION" => Ok(()),
            other => Err(dtd_error(format!("unknown declaration <!{other}"))),
        }
    }

    fn expand_references(&self, raw: &str) -> Result<String, ValidationError> {
        let regex = PARAMETER_REFERENCE_REGEX.get_or_init(|| {
            Regex::new(PARAMETER_REFERENCE_PATTERN)
                .expect("PARAMETER_REFERENCE_PATTERN is a valid regex pattern")
        });

        let mut text = raw.to_string();
        for _ in 0..MAX_ENTITY_DEPTH {
            if !regex.is_match(&text) {
                return Ok(text);
            }
            let mut missing: Option<String> = None;
            let replaced = regex
                .replace_all(&text, |caps: &Captures| {
                    match self.parameter_entities.get(&caps[1]) {
                        Some(value) => value.clone(),
                        None => {
                            missing.get_or_insert_with(|| caps[1].to_string());
                            String::new()
                        }
                    }
                })
                .into_owned();
            if let Some(name) = missing {
                return Err(dtd_error(format!("undefined parameter entity %{name};")));
            }
            if replaced.len() > MAX_EXPANSION_LEN {
                return Err(expansion_too_large());
            }
            text = replaced;
        }
        Err(dtd_error("parameter entity nesting is too deep"))
    }

    fn element_declaration(&mut self, body: &str) -> Result<(), ValidationError> {
        let mut cursor = Cursor::new(body);
        cursor.skip_whitespace();
        let name = cursor.name()?.to_string();
        cursor.skip_whitespace();

        let content = if cursor.eat_keyword("EMPTY") {
            ContentSpec::Empty
        } else if cursor.eat_keyword("ANY") {
            ContentSpec::Any
        } else if cursor.eat('(') {
            cursor.skip_whitespace();
            if cursor.eat_keyword("#PCDATA") {
                ContentSpec::Mixed(mixed_content(&mut cursor)?)
            } else {
                ContentSpec::Children(ContentModel::new(group_rest(&mut cursor)?)?)
            }
        } else {
            return Err(dtd_error(format!("invalid content specification for {name}")));
        };

        cursor.expect_end()?;
        if self.dtd.elements.contains_key(&name) {
            return Err(dtd_error(format!("redefinition of element {name}")));
        }
        self.dtd.elements.insert(name, content);
        Ok(())
    }

    fn attlist_declaration(&mut self, body: &str) -> Result<(), ValidationError> {
        let mut cursor = Cursor::new(body);
        cursor.skip_whitespace();
        let element = cursor.name()?.to_string();
        let declared = self.dtd.attributes.entry(element).or_default();

        loop {
            cursor.skip_whitespace();
            if cursor.at_end() {
                return Ok(());
            }
            let name = cursor.name()?.to_string();
            cursor.skip_whitespace();

            let kind = if cursor.peek() == Some('(') {
                AttributeType::Enumeration(cursor.token_group()?)
            } else {
                match cursor.name()? {
                    "CDATA" => AttributeType::CData,
                    "ID" => AttributeType::Id,
                    "IDREF" => AttributeType::IdRef,
                    "IDREFS" => AttributeType::IdRefs,
                    "ENTITY" => AttributeType::Entity,
                    "ENTITIES" => AttributeType::Entities,
                    "NMTOKEN" => AttributeType::NmToken,
                    "NMTOKENS" => AttributeType::NmTokens,
                    "NOTATION" => {
                        cursor.skip_whitespace();
                        AttributeType::Notation(cursor.token_group()?)
                    }
                    other => {
                        return Err(dtd_error(format!(
                            "unknown type {other} for attribute {name}"
                        )))
                    }
                }
            };
            cursor.skip_whitespace();

            let default = if cursor.eat_keyword("#REQUIRED") {
                AttributeDefault::Required
            } else if cursor.eat_keyword("#IMPLIED") {
                AttributeDefault::Implied
            } else if cursor.eat_keyword("#FIXED") {
                cursor.skip_whitespace();
                AttributeDefault::Fixed(cursor.quoted()?.to_string())
            } else {
                AttributeDefault::Value(cursor.quoted()?.to_string())
            };

            // The first declaration of an attribute is binding.
            if !declared.iter().any(|decl| decl.name == name) {
                declared.push(AttributeDecl {
                    name,
                    kind,
                    default,
                });
            }
        }
    }

    fn entity_declaration(&mut self, body: &str) -> Result<(), ValidationError> {
        let mut cursor = Cursor::new(body);
        cursor.skip_whitespace();

        if cursor.eat('%') {
            cursor.skip_whitespace();
            let name = cursor.name()?.to_string();
            cursor.skip_whitespace();
            if !matches!(cursor.peek(), Some('"') | Some('\'')) {
                return Err(dtd_error(format!(
                    "external parameter entity %{name}; is not supported"
                )));
            }
            let value = cursor.quoted()?.to_string();
            cursor.expect_end()?;
            self.parameter_entities.entry(name).or_insert(value);
        } else {
            let name = cursor.name()?.to_string();
            self.dtd.entities.insert(name);
        }
        Ok(())
    }
}

/// Parses the rest of a mixed-content spec, after `( #PCDATA`.
fn mixed_content(cursor: &mut Cursor) -> Result<Vec<String>, ValidationError> {
    let mut names = Vec::new();
    loop {
        cursor.skip_whitespace();
        if cursor.eat(')') {
            break;
        }
        if !cursor.eat('|') {
            return Err(dtd_error("expected '|' or ')' in mixed content"));
        }
        cursor.skip_whitespace();
        names.push(cursor.name()?.to_string());
    }
    if !cursor.eat('*') && !names.is_empty() {
        return Err(dtd_error("mixed content with elements must end in ')*'"));
    }
    Ok(names)
}

fn particle(cursor: &mut Cursor) -> Result<Particle, ValidationError> {
    cursor.skip_whitespace();
    if cursor.eat('(') {
        group_rest(cursor)
    } else {
        let name = cursor.name()?.to_string();
        Ok(Particle::Name(name, cursor.occurrence()))
    }
}

/// Parses a choice or sequence group whose opening `(` was already consumed.
fn group_rest(cursor: &mut Cursor) -> Result<Particle, ValidationError> {
    let mut items = vec![particle(cursor)?];
    let mut separator: Option<char> = None;

    loop {
        cursor.skip_whitespace();
        if cursor.eat(')') {
            break;
        }
        match cursor.peek() {
            Some(c @ (',' | '|')) => {
                if separator.is_some_and(|s| s != c) {
                    return Err(dtd_error("',' and '|' mixed in one content group"));
                }
                separator = Some(c);
                cursor.bump();
                items.push(particle(cursor)?);
            }
            _ => return Err(dtd_error("expected ',', '|' or ')' in content model")),
        }
    }

    let occurrence = cursor.occurrence();
    Ok(if separator == Some('|') {
        Particle::Choice(items, occurrence)
    } else {
        Particle::Sequence(items, occurrence)
    })
}

/// Index of the `>` closing a declaration, skipping quoted literals.
fn declaration_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn snippet(text: &str) -> String {
    text.chars().take(40).collect()
}

fn dtd_error(msg: impl Into<String>) -> ValidationError {
    ValidationError::Dtd(msg.into())
}

fn expansion_too_large() -> ValidationError {
    dtd_error("parameter entity expansion too large")
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.rest().strip_prefix(keyword) {
            Some(after) if !after.starts_with(is_name_char) => {
                self.pos += keyword.len();
                true
            }
            _ => false,
        }
    }

    fn name(&mut self) -> Result<&'a str, ValidationError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        if len == 0 {
            return Err(dtd_error(format!("expected a name at: {}", snippet(rest))));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn quoted(&mut self) -> Result<&'a str, ValidationError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => {
                return Err(dtd_error(format!(
                    "expected a quoted literal at: {}",
                    snippet(self.rest())
                )))
            }
        };
        self.bump();
        let rest = self.rest();
        let end = rest
            .find(quote)
            .ok_or_else(|| dtd_error("unterminated literal"))?;
        self.pos += end + quote.len_utf8();
        Ok(&rest[..end])
    }

    fn occurrence(&mut self) -> Occurrence {
        let occurrence = match self.peek() {
            Some('?') => Occurrence::Optional,
            Some('*') => Occurrence::ZeroOrMore,
            Some('+') => Occurrence::OneOrMore,
            _ => return Occurrence::Once,
        };
        self.bump();
        occurrence
    }

    /// `( token | token ... )` as used by enumerated and notation attribute types.
    fn token_group(&mut self) -> Result<Vec<String>, ValidationError> {
        if !self.eat('(') {
            return Err(dtd_error("expected '(' to open an enumeration"));
        }
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            tokens.push(self.name()?.to_string());
            self.skip_whitespace();
            if self.eat(')') {
                return Ok(tokens);
            }
            if !self.eat('|') {
                return Err(dtd_error("expected '|' or ')' in enumeration"));
            }
        }
    }

    fn expect_end(&mut self) -> Result<(), ValidationError> {
        self.skip_whitespace();
        if self.at_end() {
            Ok(())
        } else {
            Err(dtd_error(format!(
                "unexpected trailing content: {}",
                snippet(self.rest())
            )))
        }
    }
}
