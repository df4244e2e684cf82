//! In-memory sorting of projected records by a requested key.
//!
//! A [`SortResolver`] maps sort keys to strategies; unknown keys fall back to the name
//! strategy. Strategies read fields through [`SortFields`], so one strategy serves every DTO.

use crate::dates::parse_day;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// Field access for sorting, by camelCase field name.
pub trait SortFields {
    fn text_field(&self, field: &str) -> Option<&str>;
    fn number_field(&self, field: &str) -> Option<f64>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `asc`/`ascending`/`desc`/`descending`, any case. Anything else is ascending.
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("desc") | Some("descending") => Direction::Desc,
            _ => Direction::Asc,
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        }
    }
}

pub trait SortStrategy: Send + Sync {
    fn compare(&self, a: &dyn SortFields, b: &dyn SortFields, direction: Direction) -> Ordering;
}

/// Case-insensitive on `name`, else `fullName`.
pub struct NameSort;

impl SortStrategy for NameSort {
    fn compare(&self, a: &dyn SortFields, b: &dyn SortFields, direction: Direction) -> Ordering {
        let key = |x: &dyn SortFields| {
            x.text_field("name")
                .or_else(|| x.text_field("fullName"))
                .unwrap_or("")
                .to_lowercase()
        };
        direction.apply(key(a).cmp(&key(b)))
    }
}

/// On `date`, else `createdAt`. Missing or unparseable dates go last in either direction.
pub struct DateSort;

impl SortStrategy for DateSort {
    fn compare(&self, a: &dyn SortFields, b: &dyn SortFields, direction: Direction) -> Ordering {
        let key = |x: &dyn SortFields| {
            x.text_field("date")
                .or_else(|| x.text_field("createdAt"))
                .and_then(parse_day)
        };
        match (key(a), key(b)) {
            (Some(x), Some(y)) => direction.apply(x.cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// On `price`, else `totalCost`; missing counts as 0.
pub struct PriceSort;

impl SortStrategy for PriceSort {
    fn compare(&self, a: &dyn SortFields, b: &dyn SortFields, direction: Direction) -> Ordering {
        let key = |x: &dyn SortFields| {
            x.number_field("price")
                .or_else(|| x.number_field("totalCost"))
                .unwrap_or(0.0)
        };
        direction.apply(key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal))
    }
}

#[derive(Clone)]
pub struct SortResolver {
    strategies: HashMap<String, Arc<dyn SortStrategy>>,
    fallback: Arc<dyn SortStrategy>,
}

impl Default for SortResolver {
    fn default() -> Self {
        let name: Arc<dyn SortStrategy> = Arc::new(NameSort);
        let date: Arc<dyn SortStrategy> = Arc::new(DateSort);
        let price: Arc<dyn SortStrategy> = Arc::new(PriceSort);
        let mut resolver = SortResolver {
            strategies: HashMap::new(),
            fallback: Arc::clone(&name),
        };
        resolver.register("name", Arc::clone(&name));
        resolver.register("fullName", name);
        resolver.register("date", Arc::clone(&date));
        resolver.register("createdAt", date);
        resolver.register("price", Arc::clone(&price));
        resolver.register("totalCost", price);
        resolver
    }
}

impl SortResolver {
    pub fn register(&mut self, key: impl Into<String>, strategy: Arc<dyn SortStrategy>) {
        self.strategies.insert(key.into(), strategy);
    }

    pub fn resolve(&self, key: &str) -> &dyn SortStrategy {
        self.strategies
            .get(key)
            .map(|s| s.as_ref())
            .unwrap_or_else(|| self.fallback.as_ref())
    }

    /// A sorted copy of `items`; equal elements keep their input order.
    pub fn sorted<T: SortFields + Clone>(&self, items: &[T], key: &str, direction: Direction) -> Vec<T> {
        let strategy = self.resolve(key);
        let mut out = items.to_vec();
        out.sort_by(|a, b| strategy.compare(a, b, direction));
        out
    }
}
