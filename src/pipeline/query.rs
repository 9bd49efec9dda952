//! Offline evaluator for a subset of Gmail search syntax.
//!
//! In production the mail provider runs rule queries itself and the rules
//! engine only sees pre-filtered result sets. This evaluator exists so rule
//! files can be exercised against a local message fixture.
//!
//! Precedence follows Gmail: `OR` binds tighter than the implicit AND, so
//! `a b OR c` means `a AND (b OR c)`.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::error::QueryError;
use crate::pipeline::types::Message;

/// A parsed query, ready to match messages.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    source: String,
    root: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Term(Term),
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    From(String),
    To(String),
    Subject(String),
    Label(String),
    /// Provider label id, e.g. `CATEGORY_PROMOTIONS` or `UNREAD`.
    SystemLabel(String),
    NotSystemLabel(String),
    Anywhere,
    HasAttachment,
    OlderThan(Duration),
    NewerThan(Duration),
    After(DateTime<Utc>),
    Before(DateTime<Utc>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Phrase(String),
    Neg,
    Or,
    LParen,
    RParen,
    LBrace,
    RBrace,
}

impl CompiledQuery {
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(QueryError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.parse_and()?;
        match parser.peek() {
            None => {}
            Some(Token::RParen) => return Err(QueryError::Unbalanced(')')),
            Some(Token::RBrace) => return Err(QueryError::Unbalanced('}')),
            Some(_) => return Err(QueryError::UnexpectedEnd),
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Does `message` satisfy the query at time `now`?
    pub fn matches(&self, message: &Message, now: DateTime<Utc>) -> bool {
        eval(&self.root, message, now)
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '"' => {
                let (phrase, next) = read_quoted(&chars, i)?;
                tokens.push(Token::Phrase(phrase));
                i = next;
            }
            '-' if chars.get(i + 1).is_some_and(|n| !n.is_whitespace()) => {
                tokens.push(Token::Neg);
                i += 1;
            }
            _ => {
                let mut word = String::new();
                while i < chars.len() {
                    let c = chars[i];
                    if c.is_whitespace() || "(){}|".contains(c) {
                        break;
                    }
                    if c == '"' {
                        if word.ends_with(':') {
                            let (quoted, next) = read_quoted(&chars, i)?;
                            word.push_str(&quoted);
                            i = next;
                        }
                        break;
                    }
                    word.push(c);
                    i += 1;
                }
                match word.as_str() {
                    "OR" => tokens.push(Token::Or),
                    "AND" => {}
                    _ => tokens.push(Token::Word(word)),
                }
            }
        }
    }

    Ok(tokens)
}

/// Read a `"..."` starting at `start`; returns the contents and the index after the closing quote.
fn read_quoted(chars: &[char], start: usize) -> Result<(String, usize), QueryError> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '"' {
            return Ok((out, i + 1));
        }
        out.push(chars[i]);
        i += 1;
    }
    Err(QueryError::Unbalanced('"'))
}

// ── Parser ──────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Implicit AND of OR-chains, until a closing token or the end.
    fn parse_and(&mut self) -> Result<Node, QueryError> {
        let mut items = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::RParen | Token::RBrace) {
                break;
            }
            items.push(self.parse_or()?);
        }
        match items.len() {
            0 => Err(QueryError::Empty),
            1 => Ok(items.remove(0)),
            _ => Ok(Node::And(items)),
        }
    }

    fn parse_or(&mut self) -> Result<Node, QueryError> {
        let mut items = vec![self.parse_unary()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Node::Or(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Node, QueryError> {
        match self.next() {
            None => Err(QueryError::UnexpectedEnd),
            Some(Token::Neg) => Ok(Node::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_and()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(QueryError::Unbalanced('(')),
                }
            }
            Some(Token::LBrace) => {
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(Token::RBrace) => {
                            self.pos += 1;
                            break;
                        }
                        None => return Err(QueryError::Unbalanced('{')),
                        Some(Token::Or) => self.pos += 1,
                        Some(_) => items.push(self.parse_unary()?),
                    }
                }
                if items.is_empty() {
                    return Err(QueryError::Empty);
                }
                Ok(Node::Or(items))
            }
            Some(Token::Phrase(text)) => Ok(Node::Term(Term::Text(text.to_lowercase()))),
            Some(Token::Word(word)) => Ok(Node::Term(parse_term(&word)?)),
            Some(Token::Or) => Err(QueryError::UnexpectedEnd),
            Some(Token::RParen) => Err(QueryError::Unbalanced(')')),
            Some(Token::RBrace) => Err(QueryError::Unbalanced('}')),
        }
    }
}

fn parse_term(word: &str) -> Result<Term, QueryError> {
    let Some((op, value)) = word.split_once(':') else {
        return Ok(Term::Text(word.to_lowercase()));
    };

    // "10:30" or "http://..." style words are not operators
    if op.is_empty() || !op.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return Ok(Term::Text(word.to_lowercase()));
    }

    let op = op.to_lowercase();
    let value = value.trim();
    let invalid = || QueryError::InvalidValue {
        operator: op.clone(),
        value: value.to_string(),
    };
    if value.is_empty() {
        return Err(invalid());
    }
    let lower = value.to_lowercase();

    let term = match op.as_str() {
        "from" => Term::From(lower),
        "to" => Term::To(lower),
        "subject" => Term::Subject(lower),
        "label" => Term::Label(normalize_label(value)),
        "category" => {
            let id = match lower.as_str() {
                "primary" | "personal" => "CATEGORY_PERSONAL",
                "social" => "CATEGORY_SOCIAL",
                "promotions" => "CATEGORY_PROMOTIONS",
                "updates" => "CATEGORY_UPDATES",
                "forums" => "CATEGORY_FORUMS",
                _ => return Err(invalid()),
            };
            Term::SystemLabel(id.to_string())
        }
        "is" => match lower.as_str() {
            "unread" => Term::SystemLabel("UNREAD".into()),
            "read" => Term::NotSystemLabel("UNREAD".into()),
            "starred" => Term::SystemLabel("STARRED".into()),
            "important" => Term::SystemLabel("IMPORTANT".into()),
            "inbox" => Term::SystemLabel("INBOX".into()),
            _ if lower.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
                Term::SystemLabel(lower.to_ascii_uppercase())
            }
            _ => return Err(invalid()),
        },
        "in" => match lower.as_str() {
            "inbox" => Term::SystemLabel("INBOX".into()),
            "trash" => Term::SystemLabel("TRASH".into()),
            "spam" => Term::SystemLabel("SPAM".into()),
            "sent" => Term::SystemLabel("SENT".into()),
            "drafts" => Term::SystemLabel("DRAFT".into()),
            "anywhere" => Term::Anywhere,
            _ => return Err(invalid()),
        },
        "has" => match lower.as_str() {
            "attachment" => Term::HasAttachment,
            _ => return Err(invalid()),
        },
        "older_than" => Term::OlderThan(parse_relative(&lower).ok_or_else(invalid)?),
        "newer_than" => Term::NewerThan(parse_relative(&lower).ok_or_else(invalid)?),
        "after" => Term::After(parse_date(value).ok_or_else(invalid)?),
        "before" => Term::Before(parse_date(value).ok_or_else(invalid)?),
        _ => return Err(QueryError::UnsupportedOperator(op.clone())),
    };
    Ok(term)
}

/// `30d`, `6m`, `1y`. Months are 30 days, years 365.
fn parse_relative(value: &str) -> Option<Duration> {
    let unit = value.chars().last()?;
    let amount: i64 = value[..value.len() - unit.len_utf8()].parse().ok()?;
    if amount < 0 {
        return None;
    }
    let days = match unit {
        'd' => amount,
        'm' => amount.checked_mul(30)?,
        'y' => amount.checked_mul(365)?,
        _ => return None,
    };
    Duration::try_days(days)
}

/// `2024/01/31` or `2024-01-31`, midnight UTC.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '/' || c == '_' { '-' } else { c })
        .collect()
}

// ── Evaluation ──────────────────────────────────────────────────────

fn eval(node: &Node, message: &Message, now: DateTime<Utc>) -> bool {
    match node {
        Node::And(items) => items.iter().all(|n| eval(n, message, now)),
        Node::Or(items) => items.iter().any(|n| eval(n, message, now)),
        Node::Not(inner) => !eval(inner, message, now),
        Node::Term(term) => eval_term(term, message, now),
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn eval_term(term: &Term, message: &Message, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(message.received_at);
    match term {
        Term::From(v) => contains(&message.sender, v),
        Term::To(v) => message.to.iter().any(|t| contains(t, v)),
        Term::Subject(v) => contains(&message.subject, v),
        Term::Label(v) => message.labels.iter().any(|l| normalize_label(l) == *v),
        Term::SystemLabel(id) => message.has_label(id),
        Term::NotSystemLabel(id) => !message.has_label(id),
        Term::Anywhere => true,
        Term::HasAttachment => message.has_attachment,
        Term::OlderThan(d) => age > *d,
        Term::NewerThan(d) => age < *d,
        Term::After(t) => message.received_at >= *t,
        Term::Before(t) => message.received_at < *t,
        Term::Text(v) => {
            contains(&message.sender, v)
                || contains(&message.subject, v)
                || contains(&message.body, v)
                || message.to.iter().any(|t| contains(t, v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn msg(sender: &str, subject: &str, labels: &[&str], age_days: i64) -> Message {
        Message {
            id: "m".into(),
            sender: sender.into(),
            to: vec!["me@example.com".into()],
            subject: subject.into(),
            body: "Thanks for shopping with us. Click to unsubscribe.".into(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            received_at: now() - Duration::days(age_days),
            has_attachment: false,
        }
    }

    fn check(query: &str, message: &Message) -> bool {
        CompiledQuery::parse(query).unwrap().matches(message, now())
    }

    #[test]
    fn category_and_age() {
        let old_promo = msg("deals@shop.com", "Sale", &["CATEGORY_PROMOTIONS"], 45);
        let new_promo = msg("deals@shop.com", "Sale", &["CATEGORY_PROMOTIONS"], 3);
        let old_social = msg("x@social.com", "Ping", &["CATEGORY_SOCIAL"], 45);

        let q = "category:promotions older_than:30d";
        assert!(check(q, &old_promo));
        assert!(!check(q, &new_promo));
        assert!(!check(q, &old_social));
    }

    #[test]
    fn unread_and_read() {
        let unread = msg("a@b.com", "x", &["UNREAD", "INBOX"], 1);
        let read = msg("a@b.com", "x", &["INBOX"], 1);
        assert!(check("is:unread", &unread));
        assert!(!check("is:unread", &read));
        assert!(check("is:read", &read));
        assert!(check("in:inbox is:unread", &unread));
    }

    #[test]
    fn or_binds_tighter_than_and() {
        let m = msg("news@site.com", "Weekly digest", &[], 1);
        assert!(check("from:news@site.com subject:digest OR subject:nope", &m));
        assert!(!check("from:other.com subject:digest OR subject:weekly", &m));
        assert!(check("from:other.com OR from:site.com", &m));
        assert!(check("from:other.com | from:site.com", &m));
    }

    #[test]
    fn braces_are_or_groups() {
        let m = msg("billing@stripe.com", "Receipt", &[], 1);
        assert!(check("{from:paypal.com from:stripe.com}", &m));
        assert!(!check("{from:paypal.com from:square.com}", &m));
    }

    #[test]
    fn negation_and_grouping() {
        let m = msg("news@site.com", "Weekly digest", &["IMPORTANT"], 1);
        assert!(!check("-is:important", &m));
        assert!(check("-(from:spam.com OR from:junk.com)", &m));
        assert!(check("from:site.com -subject:invoice", &m));
    }

    #[test]
    fn quoted_phrases() {
        let m = msg("a@b.com", "Your order has shipped", &[], 1);
        assert!(check("subject:\"order has shipped\"", &m));
        assert!(check("\"click to unsubscribe\"", &m));
        assert!(!check("\"click here to unsubscribe\"", &m));
    }

    #[test]
    fn user_labels_normalized() {
        let m = msg("a@b.com", "x", &["Receipts/2026"], 1);
        assert!(check("label:receipts-2026", &m));
        assert!(check("label:Receipts/2026", &m));
        assert!(!check("label:receipts", &m));
    }

    #[test]
    fn newer_than_and_units() {
        let m = msg("a@b.com", "x", &[], 10);
        assert!(check("newer_than:2m", &m));
        assert!(!check("newer_than:7d", &m));
        assert!(check("older_than:1d", &m));
        assert!(!check("older_than:1y", &m));
    }

    #[test]
    fn absolute_dates() {
        let m = msg("a@b.com", "x", &[], 10); // 2026-05-22
        assert!(check("after:2026/05/01", &m));
        assert!(check("before:2026-06-01", &m));
        assert!(!check("before:2026/05/01", &m));
    }

    #[test]
    fn free_text_searches_all_fields() {
        let m = msg("alice@example.com", "Lunch", &[], 1);
        assert!(check("alice", &m));
        assert!(check("LUNCH", &m));
        assert!(check("shopping", &m));
        assert!(!check("dinner", &m));
    }

    #[test]
    fn non_operator_colons_are_text() {
        let m = msg("a@b.com", "Meeting at 10:30", &[], 1);
        assert!(check("10:30", &m));
    }

    #[test]
    fn is_accepts_inbox_and_system_labels() {
        let inbox = msg("a@b.com", "x", &["INBOX"], 1);
        let trashed = msg("a@b.com", "x", &["TRASH"], 1);
        assert!(check("is:inbox", &inbox));
        assert!(!check("is:inbox", &trashed));
        assert!(check("is:trash", &trashed));
        assert!(check("is:snoozed", &msg("a@b.com", "x", &["SNOOZED"], 1)));
        assert!(matches!(
            CompiledQuery::parse("is:a.b"),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn out_of_range_ages_are_errors() {
        for query in [
            "older_than:99999999999999999d",
            "older_than:9223372036854775807y",
            "newer_than:9223372036854775807m",
        ] {
            assert!(
                matches!(
                    CompiledQuery::parse(query),
                    Err(QueryError::InvalidValue { .. })
                ),
                "{query}"
            );
        }
    }

    #[test]
    fn rejects_bad_queries() {
        assert_eq!(CompiledQuery::parse("   "), Err(QueryError::Empty));
        assert_eq!(
            CompiledQuery::parse("size:5m"),
            Err(QueryError::UnsupportedOperator("size".into()))
        );
        assert!(matches!(
            CompiledQuery::parse("older_than:soon"),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            CompiledQuery::parse("category:junk"),
            Err(QueryError::InvalidValue { .. })
        ));
        assert_eq!(
            CompiledQuery::parse("(is:unread"),
            Err(QueryError::Unbalanced('('))
        );
        assert_eq!(
            CompiledQuery::parse("is:unread)"),
            Err(QueryError::Unbalanced(')'))
        );
        assert_eq!(
            CompiledQuery::parse("\"open"),
            Err(QueryError::Unbalanced('"'))
        );
    }

    #[test]
    fn keeps_source() {
        let q = CompiledQuery::parse("is:unread").unwrap();
        assert_eq!(q.source(), "is:unread");
    }
}
