//! Query descriptors
//!
//! A [`QueryDescriptor`] is the canonical, not-yet-executed shape of a
//! `find`. Builder calls on a cursor mutate it until the cursor executes.

use std::fmt;

use mongodb::bson::Document;

/// Fully-qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// Canonical description of a query.
///
/// Limit and skip are only sent when set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    pub collection: String,
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl QueryDescriptor {
    pub fn new(collection: impl Into<String>, filter: Document) -> Self {
        Self {
            collection: collection.into(),
            filter,
            ..Default::default()
        }
    }

    pub fn with_projection(mut self, projection: Option<Document>) -> Self {
        self.projection = projection.filter(|p| !p.is_empty());
        self
    }

    pub fn set_sort(&mut self, sort: Document) {
        self.sort = Some(sort);
    }

    /// `limit(0)` means "no limit", as in the shell.
    pub fn set_limit(&mut self, limit: i64) {
        self.limit = if limit == 0 { None } else { Some(limit) };
    }

    pub fn set_skip(&mut self, skip: u64) {
        self.skip = if skip == 0 { None } else { Some(skip) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_empty_projection_dropped() {
        let q = QueryDescriptor::new("orders", doc! {}).with_projection(Some(doc! {}));
        assert!(q.projection.is_none());
    }

    #[test]
    fn test_zero_limit_and_skip_unset() {
        let mut q = QueryDescriptor::new("orders", doc! {});
        q.set_limit(5);
        q.set_skip(2);
        assert_eq!((q.limit, q.skip), (Some(5), Some(2)));
        q.set_limit(0);
        q.set_skip(0);
        assert_eq!((q.limit, q.skip), (None, None));
    }

    #[test]
    fn test_namespace_display() {
        assert_eq!(Namespace::new("shop", "orders").to_string(), "shop.orders");
    }
}
