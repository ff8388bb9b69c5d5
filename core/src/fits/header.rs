use crate::prelude::{MosaicError, MosaicResult};

/// Value carried by a single header card.
#[derive(Debug, Clone, PartialEq)]
pub enum FitsValue {
    String(String),
    Integer(i64),
    Float(f64),
    Logical(bool),
    /// Free text of `COMMENT`/`HISTORY` cards.
    Text(String),
}

impl FitsValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FitsValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FitsValue::Integer(i) => Some(*i),
            FitsValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FitsValue::Float(f) => Some(*f),
            FitsValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

/// One keyword record of a header.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub key: String,
    pub value: FitsValue,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(key: &str, value: FitsValue) -> Self {
        Self {
            key: key.to_uppercase(),
            value,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub(crate) fn is_commentary(&self) -> bool {
        matches!(self.value, FitsValue::Text(_))
    }
}

/// Ordered FITS header. Card order is preserved on write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = key.to_uppercase();
        self.cards
            .iter()
            .position(|card| !card.is_commentary() && card.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&FitsValue> {
        self.position(key).map(|idx| &self.cards[idx].value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FitsValue::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(FitsValue::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(FitsValue::as_f64)
    }

    pub fn require_f64(&self, key: &str, context: &str) -> MosaicResult<f64> {
        self.get_f64(key).ok_or_else(|| MosaicError::MissingKeyword {
            key: key.to_uppercase(),
            context: context.to_string(),
        })
    }

    pub fn require_i64(&self, key: &str, context: &str) -> MosaicResult<i64> {
        self.get_i64(key).ok_or_else(|| MosaicError::MissingKeyword {
            key: key.to_uppercase(),
            context: context.to_string(),
        })
    }

    pub fn require_str(&self, key: &str, context: &str) -> MosaicResult<&str> {
        self.get_str(key).ok_or_else(|| MosaicError::MissingKeyword {
            key: key.to_uppercase(),
            context: context.to_string(),
        })
    }

    /// Replaces the value of an existing card or appends a new one.
    pub fn set(&mut self, key: &str, value: FitsValue) {
        match self.position(key) {
            Some(idx) => self.cards[idx].value = value,
            None => self.cards.push(Card::new(key, value)),
        }
    }

    pub fn set_f64(&mut self, key: &str, value: f64) {
        self.set(key, FitsValue::Float(value));
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.set(key, FitsValue::Integer(value));
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set(key, FitsValue::String(value.to_string()));
    }

    /// Inserts a card in front of `anchor`, appending when the anchor is absent.
    /// An existing card with the same key is moved.
    pub fn insert_before(&mut self, anchor: &str, key: &str, value: FitsValue) {
        self.remove(key);
        let card = Card::new(key, value);
        match self.position(anchor) {
            Some(idx) => self.cards.insert(idx, card),
            None => self.cards.push(card),
        }
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn remove(&mut self, key: &str) -> Option<FitsValue> {
        self.position(key).map(|idx| self.cards.remove(idx).value)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&Card) -> bool) {
        self.cards.retain(|card| keep(card));
    }

    /// Reference value of the spectral axis: the axis whose `CTYPEn` starts
    /// with `FREQ`, or axis 3 when no axis is labelled.
    pub fn spectral_reference(&self, context: &str) -> MosaicResult<f64> {
        let naxis = self.get_i64("NAXIS").unwrap_or(0).max(3);
        for axis in 1..=naxis {
            let is_freq = self
                .get_str(&format!("CTYPE{}", axis))
                .map(|ctype| ctype.trim().to_uppercase().starts_with("FREQ"))
                .unwrap_or(false);
            if is_freq {
                return self.require_f64(&format!("CRVAL{}", axis), context);
            }
        }
        self.require_f64("CRVAL3", context)
    }

    pub fn object(&self, context: &str) -> MosaicResult<String> {
        self.require_str("OBJECT", context)
            .map(|name| name.trim().to_string())
    }
}
