// The match-expression engine
//
// Rules are boolean predicates over window attributes, written either
// in the legacy `T:M[F]:PATTERN` form or the modern grammar of leaves
// combined with `&&`, `||` and parenthesized groups. Parsing is
// hand-written recursive descent; evaluation walks the tree against a
// MatchTarget so the engine never touches X directly.
use utils::log;

use regex::RegexBuilder;

use std::cell::Cell;
use std::fmt;

/// Maximum group nesting depth.
const MAX_LEVELS: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LeafOp {
    /// No operator: the property merely has to exist
    Exists,
    Eq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    /// `^` starts-with
    Start,
    /// `*` contains
    Contains,
    /// `%` shell-style wildcard
    Wildcard,
    /// `~` regular expression
    Regex,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchOp {
    And,
    Or,
    Xor,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Predef {
    Id,
    X,
    Y,
    X2,
    Y2,
    Width,
    Height,
    WidthB,
    HeightB,
    BorderWidth,
    Fullscreen,
    OverrideRedirect,
    Focused,
    Wmwin,
    Client,
    WindowType,
    Name,
    ClassG,
    ClassI,
    Role,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TargetType {
    Undefined,
    String,
    Cardinal,
    Window,
    Atom,
    Drawable,
}

/// Predefined targets with their fixed types. Case-sensitive.
const PREDEFS: [(&str, Predef, TargetType); 20] = [
    ("id", Predef::Id, TargetType::Cardinal),
    ("x", Predef::X, TargetType::Cardinal),
    ("y", Predef::Y, TargetType::Cardinal),
    ("x2", Predef::X2, TargetType::Cardinal),
    ("y2", Predef::Y2, TargetType::Cardinal),
    ("width", Predef::Width, TargetType::Cardinal),
    ("height", Predef::Height, TargetType::Cardinal),
    ("widthb", Predef::WidthB, TargetType::Cardinal),
    ("heightb", Predef::HeightB, TargetType::Cardinal),
    ("border_width", Predef::BorderWidth, TargetType::Cardinal),
    ("fullscreen", Predef::Fullscreen, TargetType::Cardinal),
    ("override_redirect", Predef::OverrideRedirect, TargetType::Cardinal),
    ("focused", Predef::Focused, TargetType::Cardinal),
    ("wmwin", Predef::Wmwin, TargetType::Cardinal),
    ("client", Predef::Client, TargetType::Window),
    ("window_type", Predef::WindowType, TargetType::String),
    ("name", Predef::Name, TargetType::String),
    ("class_g", Predef::ClassG, TargetType::String),
    ("class_i", Predef::ClassI, TargetType::String),
    ("role", Predef::Role, TargetType::String),
];

#[derive(Clone, Debug, PartialEq)]
pub enum PatternValue {
    Int(i64),
    Str(String),
}

#[derive(Clone, Debug)]
pub struct Leaf {
    pub neg: bool,
    pub op: LeafOp,
    pub match_kind: MatchKind,
    pub ignorecase: bool,
    pub target: String,
    pub predef: Option<Predef>,
    /// `@`: evaluate the property against the client window
    pub on_client: bool,
    pub index: Option<usize>,
    pub target_type: TargetType,
    pub format: u32,
    pub pattern: Option<PatternValue>,
    compiled: Option<regex::Regex>,
}

// The compiled regex is derived state and has no meaningful equality
impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.neg == other.neg
            && self.op == other.op
            && self.match_kind == other.match_kind
            && self.ignorecase == other.ignorecase
            && self.target == other.target
            && self.predef == other.predef
            && self.on_client == other.on_client
            && self.index == other.index
            && self.target_type == other.target_type
            && self.format == other.format
            && self.pattern == other.pattern
    }
}

impl Leaf {
    fn new() -> Leaf {
        Leaf {
            neg: false,
            op: LeafOp::Exists,
            match_kind: MatchKind::Exact,
            ignorecase: false,
            target: String::new(),
            predef: None,
            on_client: false,
            index: None,
            target_type: TargetType::Undefined,
            format: 0,
            pattern: None,
            compiled: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cond {
    Branch {
        neg: bool,
        op: BranchOp,
        left: Box<Cond>,
        right: Box<Cond>,
    },
    Leaf(Leaf),
}

/// Session-level tracking the parsed rules require: whether window
/// metadata strings and focus have to be kept current, and which
/// non-predefined atoms rule caches depend on.
#[derive(Default, Debug)]
pub struct TrackingFlags {
    pub track_focus: bool,
    pub track_wdata: bool,
    pub tracked_atoms: Vec<String>,
}

/// Everything the evaluator asks about a window.
pub trait MatchTarget {
    fn predef_int(&self, predef: Predef) -> Option<i64>;
    fn predef_str(&self, predef: Predef) -> Option<String>;
    fn property_int(&self, name: &str, on_client: bool, index: usize, format: u32) -> Option<i64>;
    fn property_str(&self, name: &str, on_client: bool, index: usize) -> Option<String>;
    /// Fetch an atom-valued property and resolve the atom to its name
    fn property_atom_name(&self, name: &str, on_client: bool, index: usize) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Parser

struct Parser<'a> {
    chars: Vec<char>,
    pattern: &'a str,
    pos: usize,
    flags: &'a mut TrackingFlags,
}

type ParseResult<T> = Result<T, String>;

impl<'a> Parser<'a> {
    fn new(pattern: &'a str, flags: &'a mut TrackingFlags) -> Parser<'a> {
        Parser {
            chars: pattern.chars().collect(),
            pattern,
            pos: 0,
            flags,
        }
    }

    fn error<T>(&self, message: &str) -> ParseResult<T> {
        Err(format!(
            "pattern {}, pos {}: {}",
            self.pattern, self.pos, message
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    /// Parse a group: elements separated by logical operators, up to a
    /// `)` or end of input.
    ///
    /// A maximum of two elements is kept pending; when a third arrives
    /// the first two are combined by operator precedence. This limits
    /// the grammar to two precedence levels (`&&` over `||`) with
    /// fixed left-to-right associativity.
    fn parse_group(&mut self, level: usize) -> ParseResult<Cond> {
        if level > MAX_LEVELS {
            return self.error("Exceeded maximum recursion levels");
        }

        let endchar = if level > 0 { Some(')') } else { None };

        let mut eles: [Option<Cond>; 2] = [None, None];
        // ops[1] joins eles[0] and eles[1]; ops[2] trails eles[1]
        let mut ops: [Option<BranchOp>; 3] = [None, None, None];
        let mut elei = 0;
        let mut neg = false;
        let mut next_expected = true;

        loop {
            self.skip_spaces();
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };

            if c == ')' {
                break;
            }

            if c == '!' {
                if !next_expected {
                    return self.error("Unexpected \"!\"");
                }
                neg = !neg;
                self.pos += 1;
                continue;
            }

            if c == '&' || c == '|' {
                if next_expected {
                    return self.error("Unexpected logical operator");
                }
                next_expected = true;
                if self.starts_with("&&") {
                    ops[elei] = Some(BranchOp::And);
                    self.pos += 2;
                } else if self.starts_with("||") {
                    ops[elei] = Some(BranchOp::Or);
                    self.pos += 2;
                } else {
                    return self.error("Illegal logical operator");
                }
                continue;
            }

            // Parsing an element
            if !next_expected {
                return self.error("Unexpected expression");
            }

            let element = self.parse_element(level)?;
            let element = apply_negation(element, std::mem::take(&mut neg));

            if elei == 2 {
                let op1 = ops[1].unwrap();
                let op2 = ops[2].take().unwrap();
                if branch_precedence(op1) >= branch_precedence(op2) {
                    // Fold the first two elements, keep the new one
                    let left = eles[0].take().unwrap();
                    let mid = eles[1].take().unwrap();
                    eles[0] = Some(make_branch(op1, left, mid));
                    ops[1] = Some(op2);
                    eles[1] = Some(element);
                } else {
                    // The tighter operator grabs the new element
                    let mid = eles[1].take().unwrap();
                    eles[1] = Some(make_branch(op2, mid, element));
                }
            } else {
                eles[elei] = Some(element);
                elei += 1;
            }
            next_expected = false;
        }

        // Check the end character is the expected one
        match endchar {
            Some(end) => {
                if self.peek() != Some(end) {
                    return self.error("Expected ')' but found end of string");
                }
                self.pos += 1;
            }
            None => {
                if self.peek().is_some() {
                    return self.error("Expected end of string");
                }
            }
        }

        if elei == 0 {
            return self.error("Empty group");
        }
        if next_expected {
            return self.error("Missing rule before end of group");
        }

        if elei == 2 {
            let left = eles[0].take().unwrap();
            let right = eles[1].take().unwrap();
            return Ok(make_branch(ops[1].unwrap(), left, right));
        }
        Ok(eles[0].take().unwrap())
    }

    fn parse_element(&mut self, level: usize) -> ParseResult<Cond> {
        if self.eat('(') {
            return self.parse_group(level + 1);
        }
        let leaf = self.parse_leaf()?;
        Ok(Cond::Leaf(leaf))
    }

    fn parse_leaf(&mut self) -> ParseResult<Leaf> {
        let mut leaf = Leaf::new();

        // Negation marks
        while self.eat('!') {
            leaf.neg = !leaf.neg;
            self.skip_spaces();
        }

        // Target name
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        if self.pos == start {
            return self.error("Empty target");
        }
        leaf.target = self.chars[start..self.pos].iter().collect();

        for (name, predef, target_type) in PREDEFS.iter() {
            if *name == leaf.target {
                leaf.predef = Some(*predef);
                leaf.target_type = *target_type;
                break;
            }
        }

        self.skip_spaces();

        // Target-on-client flag
        if self.eat('@') {
            leaf.on_client = true;
            self.skip_spaces();
        }

        // Index
        if self.eat('[') {
            self.skip_spaces();
            let index = self.parse_integer()?;
            if index < 0 {
                return self.error("Index number invalid");
            }
            if leaf.predef.is_some() {
                return self.error("Predefined targets can't have an index");
            }
            leaf.index = Some(index as usize);
            self.skip_spaces();
            if !self.eat(']') {
                return self.error("Index end marker not found");
            }
            self.skip_spaces();
        }

        // Type and format
        if self.eat(':') {
            self.skip_spaces();

            let format_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
            let format: Option<u32> = if self.pos > format_start {
                let digits: String = self.chars[format_start..self.pos].iter().collect();
                digits.parse().ok()
            } else {
                None
            };
            self.skip_spaces();

            let type_char = match self.bump() {
                Some(c) => c,
                None => return self.error("Invalid type character"),
            };
            let target_type = match type_char {
                'w' => TargetType::Window,
                'd' => TargetType::Drawable,
                'c' => TargetType::Cardinal,
                's' => TargetType::String,
                'a' => TargetType::Atom,
                _ => return self.error("Invalid type character"),
            };

            if leaf.predef.is_some() {
                log::error!("Type specified for a default target will be ignored");
            } else {
                leaf.target_type = target_type;
            }
            self.skip_spaces();

            // Default format by type
            if leaf.predef.is_none() && leaf.format == 0 {
                leaf.format = match leaf.target_type {
                    TargetType::Window | TargetType::Drawable | TargetType::Atom => 32,
                    TargetType::String => 8,
                    _ => 0,
                };
            }

            if let Some(format) = format {
                if leaf.predef.is_some() {
                    log::error!("Format specified on a default target will be ignored");
                } else if leaf.target_type == TargetType::String {
                    log::error!("Format specified on a string target will be ignored");
                } else {
                    leaf.format = format;
                }
            }
        }

        if leaf.target_type == TargetType::Undefined {
            return self.error("Target type cannot be determined");
        }
        if leaf.format != 0 && leaf.format != 8 && leaf.format != 16 && leaf.format != 32 {
            return self.error("Invalid format");
        }

        self.parse_op(&mut leaf)?;
        self.parse_pattern(&mut leaf)?;
        self.postprocess(&mut leaf)?;

        Ok(leaf)
    }

    fn parse_op(&mut self, leaf: &mut Leaf) -> ParseResult<()> {
        self.skip_spaces();
        while self.eat('!') {
            leaf.neg = !leaf.neg;
            self.skip_spaces();
        }

        // Match qualifiers
        match self.peek() {
            Some('*') => {
                leaf.match_kind = MatchKind::Contains;
                self.pos += 1;
            }
            Some('^') => {
                leaf.match_kind = MatchKind::Start;
                self.pos += 1;
            }
            Some('%') => {
                leaf.match_kind = MatchKind::Wildcard;
                self.pos += 1;
            }
            Some('~') => {
                leaf.match_kind = MatchKind::Regex;
                self.pos += 1;
            }
            _ => (),
        }
        self.skip_spaces();

        // Flags
        while self.eat('?') {
            leaf.ignorecase = true;
            self.skip_spaces();
        }

        // Operator
        while matches!(self.peek(), Some('=') | Some('>') | Some('<')) {
            let c = self.bump().unwrap();
            leaf.op = match (c, leaf.op) {
                ('=', LeafOp::Gt) => LeafOp::GtEq,
                ('=', LeafOp::Lt) => LeafOp::LtEq,
                ('=', LeafOp::Exists) => LeafOp::Eq,
                ('>', LeafOp::Exists) => LeafOp::Gt,
                ('<', LeafOp::Exists) => LeafOp::Lt,
                _ => return self.error("Duplicate operator"),
            };
            self.skip_spaces();
        }

        if leaf.op != LeafOp::Eq && (leaf.match_kind != MatchKind::Exact || leaf.ignorecase) {
            return self.error("Exists/greater-than/less-than operators cannot have a qualifier");
        }

        Ok(())
    }

    fn parse_integer(&mut self) -> ParseResult<i64> {
        self.skip_spaces();
        let negative = self.eat('-');

        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        if self.pos == start {
            return self.error("No number found");
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        // Like strtol with base 0: 0x hex, leading 0 octal, else decimal
        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
        {
            i64::from_str_radix(hex, 16)
        } else if text.len() > 1 && text.starts_with('0') {
            i64::from_str_radix(&text[1..], 8)
        } else {
            text.parse()
        };

        match parsed {
            Ok(value) => Ok(if negative { -value } else { value }),
            Err(_) => self.error("Trailing characters after a numeric pattern"),
        }
    }

    fn parse_pattern(&mut self, leaf: &mut Leaf) -> ParseResult<()> {
        // Exists operator has no pattern
        if leaf.op == LeafOp::Exists {
            return Ok(());
        }

        self.skip_spaces();

        if self.starts_with("true") && !is_word_char(self.chars.get(self.pos + 4)) {
            leaf.pattern = Some(PatternValue::Int(1));
            self.pos += 4;
        } else if self.starts_with("false") && !is_word_char(self.chars.get(self.pos + 5)) {
            leaf.pattern = Some(PatternValue::Int(0));
            self.pos += 5;
        } else if matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '-') {
            let value = self.parse_integer()?;
            leaf.pattern = Some(PatternValue::Int(value));
        } else {
            // A string pattern, optionally raw
            let mut raw = false;
            if matches!(self.peek(), Some('r') | Some('R')) {
                raw = true;
                self.pos += 1;
                self.skip_spaces();
            }

            let delim = match self.peek() {
                Some(c @ '"') | Some(c @ '\'') => c,
                _ => return self.error("Invalid pattern type"),
            };
            self.pos += 1;

            let mut value = String::new();
            loop {
                let c = match self.bump() {
                    Some(c) => c,
                    None => return self.error("Premature end of pattern string"),
                };
                if c == delim {
                    break;
                }
                if c == '\\' && !raw {
                    let escaped = match self.bump() {
                        Some(c) => c,
                        None => return self.error("Premature end of pattern string"),
                    };
                    match escaped {
                        '\\' => value.push('\\'),
                        '\'' => value.push('\''),
                        '"' => value.push('"'),
                        'a' => value.push('\x07'),
                        'b' => value.push('\x08'),
                        'f' => value.push('\x0c'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'v' => value.push('\x0b'),
                        'o' | 'x' => {
                            let radix = if escaped == 'o' { 8 } else { 16 };
                            let digits: String = (0..2).filter_map(|_| self.bump()).collect();
                            match u8::from_str_radix(&digits, radix) {
                                Ok(byte) if byte > 0 => value.push(byte as char),
                                _ => {
                                    return self
                                        .error("Invalid octal/hex escape sequence")
                                }
                            }
                        }
                        _ => return self.error("Invalid escape sequence"),
                    }
                } else {
                    value.push(c);
                }
            }
            leaf.pattern = Some(PatternValue::Str(value));
        }

        self.skip_spaces();

        // Check the pattern type fits the target type
        let is_string_target = matches!(leaf.target_type, TargetType::String | TargetType::Atom);
        match &leaf.pattern {
            Some(PatternValue::Str(_)) if !is_string_target => {
                return self.error("Pattern type incompatible with target type")
            }
            Some(PatternValue::Int(_)) if is_string_target => {
                return self.error("Pattern type incompatible with target type")
            }
            _ => (),
        }

        if let Some(PatternValue::Int(_)) = leaf.pattern {
            if leaf.match_kind != MatchKind::Exact {
                return self.error("Integer/boolean pattern cannot have operator qualifiers");
            }
            if leaf.ignorecase {
                return self.error("Integer/boolean pattern cannot have flags");
            }
        }
        if let Some(PatternValue::Str(_)) = leaf.pattern {
            if matches!(leaf.op, LeafOp::Gt | LeafOp::GtEq | LeafOp::Lt | LeafOp::LtEq) {
                return self.error("String pattern cannot have an arithmetic operator");
            }
        }

        Ok(())
    }

    fn postprocess(&mut self, leaf: &mut Leaf) -> ParseResult<()> {
        // Record what the session has to keep up to date for this rule
        match leaf.predef {
            Some(Predef::Focused) => self.flags.track_focus = true,
            Some(Predef::Name) | Some(Predef::ClassG) | Some(Predef::ClassI)
            | Some(Predef::Role) => self.flags.track_wdata = true,
            Some(_) => (),
            None => {
                if !self.flags.tracked_atoms.contains(&leaf.target) {
                    self.flags.tracked_atoms.push(leaf.target.clone());
                }
            }
        }

        // Compile wildcard and regex patterns up front
        if let Some(PatternValue::Str(pattern)) = &leaf.pattern {
            let source = match leaf.match_kind {
                MatchKind::Regex => Some(pattern.clone()),
                MatchKind::Wildcard => Some(wildcard_to_regex(pattern)),
                _ => None,
            };
            if let Some(source) = source {
                match RegexBuilder::new(&source)
                    .case_insensitive(leaf.ignorecase)
                    .build()
                {
                    Ok(regex) => leaf.compiled = Some(regex),
                    Err(e) => return self.error(&format!("Regex parsing failed: {}", e)),
                }
            }
        }

        Ok(())
    }

    /// The legacy `T:M[F]:PATTERN` form.
    fn parse_legacy(&mut self) -> ParseResult<Cond> {
        let mut leaf = Leaf::new();
        leaf.op = LeafOp::Eq;

        let (predef, target) = match self.bump() {
            Some('n') => (Predef::Name, "name"),
            Some('i') => (Predef::ClassI, "class_i"),
            Some('g') => (Predef::ClassG, "class_g"),
            Some('r') => (Predef::Role, "role"),
            _ => return self.error("Legacy parser: target invalid"),
        };
        leaf.predef = Some(predef);
        leaf.target = target.to_string();
        leaf.target_type = TargetType::String;

        if !self.eat(':') {
            return self.error("Legacy parser: invalid format");
        }

        leaf.match_kind = match self.bump() {
            Some('e') => MatchKind::Exact,
            Some('a') => MatchKind::Contains,
            Some('s') => MatchKind::Start,
            Some('w') => MatchKind::Wildcard,
            Some('p') => MatchKind::Regex,
            _ => return self.error("Legacy parser: type invalid"),
        };

        while self.peek() != Some(':') {
            match self.bump() {
                Some('i') => leaf.ignorecase = true,
                _ => return self.error("Legacy parser: flag invalid"),
            }
        }
        self.pos += 1;

        let pattern: String = self.chars[self.pos..].iter().collect();
        self.pos = self.chars.len();
        leaf.pattern = Some(PatternValue::Str(pattern));

        self.postprocess(&mut leaf)?;
        Ok(Cond::Leaf(leaf))
    }
}

fn is_word_char(c: Option<&char>) -> bool {
    matches!(c, Some(c) if c.is_alphanumeric() || *c == '_')
}

fn branch_precedence(op: BranchOp) -> i32 {
    match op {
        BranchOp::And => 2,
        BranchOp::Or => 1,
        BranchOp::Xor => 1,
    }
}

fn make_branch(op: BranchOp, left: Cond, right: Cond) -> Cond {
    Cond::Branch {
        neg: false,
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn apply_negation(cond: Cond, neg: bool) -> Cond {
    if !neg {
        return cond;
    }
    match cond {
        Cond::Branch {
            neg,
            op,
            left,
            right,
        } => Cond::Branch {
            neg: !neg,
            op,
            left,
            right,
        },
        Cond::Leaf(mut leaf) => {
            leaf.neg = !leaf.neg;
            Cond::Leaf(leaf)
        }
    }
}

/// Translate a shell wildcard to an anchored regex.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// Parse one full expression, legacy or modern.
pub fn parse(pattern: &str, flags: &mut TrackingFlags) -> Result<Cond, String> {
    let mut parser = Parser::new(pattern, flags);
    if pattern.len() >= 2 && pattern.as_bytes()[1] == b':' {
        parser.parse_legacy()
    } else {
        parser.parse_group(0)
    }
}

// ---------------------------------------------------------------------------
// Printer

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cond::Branch {
                neg,
                op,
                left,
                right,
            } => {
                if *neg {
                    write!(f, "!")?;
                }
                let op = match op {
                    BranchOp::And => "&&",
                    BranchOp::Or => "||",
                    BranchOp::Xor => "||",
                };
                write!(f, "({} {} {})", left, op, right)
            }
            Cond::Leaf(leaf) => write!(f, "{}", leaf),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op == LeafOp::Exists && self.neg {
            write!(f, "!")?;
        }

        write!(f, "{}", self.target)?;
        if self.on_client {
            write!(f, "@")?;
        }
        if let Some(index) = self.index {
            write!(f, "[{}]", index)?;
        }
        if self.predef.is_none() {
            let type_char = match self.target_type {
                TargetType::Window => 'w',
                TargetType::Drawable => 'd',
                TargetType::Cardinal => 'c',
                TargetType::String => 's',
                TargetType::Atom => 'a',
                TargetType::Undefined => '?',
            };
            write!(f, ":{}{}", self.format, type_char)?;
        }

        if self.op == LeafOp::Exists {
            return Ok(());
        }
        write!(f, " ")?;

        if self.neg {
            write!(f, "!")?;
        }
        match self.match_kind {
            MatchKind::Exact => (),
            MatchKind::Contains => write!(f, "*")?,
            MatchKind::Start => write!(f, "^")?,
            MatchKind::Regex => write!(f, "~")?,
            MatchKind::Wildcard => write!(f, "%")?,
        }
        if self.ignorecase {
            write!(f, "?")?;
        }
        match self.op {
            LeafOp::Exists => (),
            LeafOp::Eq => write!(f, "=")?,
            LeafOp::Gt => write!(f, ">")?,
            LeafOp::GtEq => write!(f, ">=")?,
            LeafOp::Lt => write!(f, "<")?,
            LeafOp::LtEq => write!(f, "<=")?,
        }

        match &self.pattern {
            Some(PatternValue::Int(value)) => write!(f, " {}", value),
            Some(PatternValue::Str(value)) => {
                write!(f, " \"")?;
                for c in value.chars() {
                    match c {
                        '\\' => write!(f, "\\\\")?,
                        '"' => write!(f, "\\\"")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator

fn match_leaf(target: &dyn MatchTarget, leaf: &Leaf) -> (bool, bool) {
    let mut result = false;
    let mut error = true;

    let index = leaf.index.unwrap_or(0);
    let wants_string = matches!(leaf.target_type, TargetType::String | TargetType::Atom);

    if !wants_string {
        // Integer comparison
        let value = match leaf.predef {
            Some(predef) => target.predef_int(predef),
            None => target.property_int(&leaf.target, leaf.on_client, index, leaf.format),
        };

        if let Some(value) = value {
            error = false;
            let pattern = match &leaf.pattern {
                Some(PatternValue::Int(pattern)) => *pattern,
                _ => 0,
            };
            result = match leaf.op {
                LeafOp::Exists => {
                    if leaf.predef.is_some() {
                        value != 0
                    } else {
                        true
                    }
                }
                LeafOp::Eq => value == pattern,
                LeafOp::Gt => value > pattern,
                LeafOp::GtEq => value >= pattern,
                LeafOp::Lt => value < pattern,
                LeafOp::LtEq => value <= pattern,
            };
        }
    } else {
        // String comparison
        let value = match leaf.predef {
            Some(predef) => target.predef_str(predef),
            None if leaf.target_type == TargetType::Atom => {
                target.property_atom_name(&leaf.target, leaf.on_client, index)
            }
            None => target.property_str(&leaf.target, leaf.on_client, index),
        };

        if let Some(value) = value {
            error = false;
            result = match leaf.op {
                LeafOp::Exists => true,
                LeafOp::Eq => {
                    let pattern = match &leaf.pattern {
                        Some(PatternValue::Str(pattern)) => pattern.as_str(),
                        _ => "",
                    };
                    match leaf.match_kind {
                        MatchKind::Exact => {
                            if leaf.ignorecase {
                                value.eq_ignore_ascii_case(pattern)
                            } else {
                                value == pattern
                            }
                        }
                        MatchKind::Contains => {
                            if leaf.ignorecase {
                                value.to_ascii_lowercase().contains(&pattern.to_ascii_lowercase())
                            } else {
                                value.contains(pattern)
                            }
                        }
                        MatchKind::Start => {
                            if leaf.ignorecase {
                                value
                                    .to_ascii_lowercase()
                                    .starts_with(&pattern.to_ascii_lowercase())
                            } else {
                                value.starts_with(pattern)
                            }
                        }
                        MatchKind::Wildcard | MatchKind::Regex => match &leaf.compiled {
                            Some(regex) => regex.is_match(&value),
                            None => false,
                        },
                    }
                }
                _ => {
                    error = true;
                    false
                }
            };
        }
    }

    (result, error)
}

/// Evaluate one condition tree against a window.
pub fn match_once(target: &dyn MatchTarget, cond: &Cond) -> bool {
    let (mut result, error, neg) = match cond {
        Cond::Branch {
            neg,
            op,
            left,
            right,
        } => {
            let result = match op {
                BranchOp::And => match_once(target, left) && match_once(target, right),
                BranchOp::Or => match_once(target, left) || match_once(target, right),
                BranchOp::Xor => match_once(target, left) != match_once(target, right),
            };
            (result, false, *neg)
        }
        Cond::Leaf(leaf) => {
            let (result, mut error) = match_leaf(target, leaf);
            // For the exists operator missing properties are a plain
            // false, never a hard error
            let result = if leaf.op == LeafOp::Exists && error {
                error = false;
                false
            } else {
                result
            };
            (result, error, leaf.neg)
        }
    };

    if error {
        result = false;
    }
    if neg {
        result = !result;
    }
    result
}

// ---------------------------------------------------------------------------
// Rule lists

#[derive(Debug, PartialEq)]
pub struct Rule {
    pub cond: Cond,
    /// Caller-defined payload; opacity rules store the percentage here
    pub data: i64,
}

/// An ordered list of conditions with a last-match cache.
#[derive(Default, Debug)]
pub struct RuleList {
    rules: Vec<Rule>,
    /// Index of the rule that matched last, tried first next time
    cache: Cell<Option<usize>>,
}

impl RuleList {
    pub fn new() -> RuleList {
        RuleList::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a pattern and append it. Parse failures discard the rule.
    pub fn parse_add(
        &mut self,
        pattern: &str,
        data: i64,
        flags: &mut TrackingFlags,
    ) -> Result<(), String> {
        let cond = parse(pattern, flags)?;
        self.rules.push(Rule { cond, data });
        Ok(())
    }

    /// Match a window against the list, checking the cached entry
    /// first. Returns the matching rule's data.
    pub fn matches(&self, target: &dyn MatchTarget) -> Option<i64> {
        if let Some(cached) = self.cache.get() {
            if let Some(rule) = self.rules.get(cached) {
                if match_once(target, &rule.cond) {
                    return Some(rule.data);
                }
            }
        }

        for (i, rule) in self.rules.iter().enumerate() {
            if match_once(target, &rule.cond) {
                self.cache.set(Some(i));
                return Some(rule.data);
            }
        }
        None
    }

    pub fn invalidate_cache(&self) {
        self.cache.set(None);
    }
}

#[cfg(test)]
mod tests;
