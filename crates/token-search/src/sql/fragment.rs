//! SQL fragments with bound parameters.

/// A fragment of SQL with bound parameters.
///
/// Placeholders are numbered `?N`, starting after `param_offset`, so a
/// fragment can be embedded in an outer statement that already binds
/// `?1..?offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
    param_offset: usize,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    /// Text parameter.
    Text(String),
    /// Text array parameter.
    TextArray(Vec<String>),
}

impl SqlParam {
    /// Creates a text parameter.
    pub fn text(s: impl Into<String>) -> Self {
        SqlParam::Text(s.into())
    }
}

impl SqlFragment {
    /// Creates an empty fragment whose first placeholder is `?(offset + 1)`.
    pub fn at_offset(offset: usize) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            param_offset: offset,
        }
    }

    /// Adds a parameter and returns its placeholder.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.param_offset + self.params.len())
    }

    /// Offset to hand to the next fragment rendered into this one.
    pub fn next_offset(&self) -> usize {
        self.param_offset + self.params.len()
    }

    /// Appends raw SQL.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends a fragment rendered at [`next_offset`](Self::next_offset).
    pub fn append(&mut self, other: SqlFragment) {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_respect_offset() {
        let mut fragment = SqlFragment::at_offset(2);
        assert_eq!(fragment.add_param(SqlParam::text("a")), "?3");
        assert_eq!(fragment.add_param(SqlParam::text("b")), "?4");
        assert_eq!(fragment.next_offset(), 4);
    }

    #[test]
    fn test_append_keeps_numbering() {
        let mut outer = SqlFragment::at_offset(0);
        let p = outer.add_param(SqlParam::text("x"));
        outer.push_sql(&format!("a = {} AND ", p));

        let mut inner = SqlFragment::at_offset(outer.next_offset());
        let q = inner.add_param(SqlParam::TextArray(vec!["y".to_string()]));
        inner.push_sql(&format!("b && {}", q));
        outer.append(inner);

        assert_eq!(outer.sql, "a = ?1 AND b && ?2");
        assert_eq!(outer.params.len(), 2);
    }
}
