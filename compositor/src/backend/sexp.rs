//! Plist helpers for the s-expression inputs (skeleton recordings and the
//! headless event feed).

use lexpr::Value;

/// Elements of a proper list; `None` for atoms and dotted lists.
pub fn list_items(value: &Value) -> Option<Vec<&Value>> {
    let mut items = Vec::new();
    let mut current = value;
    loop {
        match current {
            Value::Cons(pair) => {
                items.push(pair.car());
                current = pair.cdr();
            }
            Value::Null | Value::Nil => return Some(items),
            _ => return None,
        }
    }
}

/// Value following `:key` in a plist.  Accepts both `Value::Keyword("key")`
/// and `Value::Symbol(":key")` spellings.
pub fn plist_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

pub fn symbol_name(value: &Value) -> Option<&str> {
    match value {
        Value::Keyword(k) => Some(k.as_ref()),
        Value::Symbol(s) => {
            let s: &str = s;
            Some(s.strip_prefix(':').unwrap_or(s))
        }
        _ => None,
    }
}

pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Truthiness in the elisp sense: `nil`, `()` and `#f` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Nil | Value::Null | Value::Bool(false) => false,
        Value::Symbol(s) => &**s != "nil",
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plist_get_both_key_spellings() {
        let v = lexpr::from_str("(:a 1 :b two)").unwrap();
        assert_eq!(plist_get(&v, "a").and_then(number), Some(1.0));
        assert_eq!(plist_get(&v, "b").and_then(symbol_name), Some("two"));
        assert!(plist_get(&v, "c").is_none());
    }

    #[test]
    fn test_list_items_rejects_atoms() {
        let v = lexpr::from_str("(1 2 3)").unwrap();
        assert_eq!(list_items(&v).map(|l| l.len()), Some(3));
        assert!(list_items(&lexpr::from_str("7").unwrap()).is_none());
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(&lexpr::from_str("t").unwrap()));
        assert!(!truthy(&lexpr::from_str("nil").unwrap()));
        assert!(!truthy(&lexpr::from_str("()").unwrap()));
    }
}
