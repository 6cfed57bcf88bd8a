use serde::Serialize;

use crate::domain::SynapseId;

/// Row returned by a fileview query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRow {
    pub path: String,
    pub name: String,
    pub id: SynapseId,
}

/// Path/name predicate over a fileview, restricted to file entities.
///
/// Patterns use SQL `LIKE` syntax (`%` any run, `_` one character). Within
/// `path_like` and `name_like` the patterns are OR-ed; the groups are AND-ed
/// with each other and with the path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexFilter {
    pub path_prefix: String,
    pub path_like: Vec<String>,
    pub name_like: Vec<String>,
}

impl IndexFilter {
    pub fn under(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn path_like(mut self, pattern: impl Into<String>) -> Self {
        self.path_like.push(pattern.into());
        self
    }

    pub fn name_like(mut self, pattern: impl Into<String>) -> Self {
        self.name_like.push(pattern.into());
        self
    }

    pub fn to_sql(&self, fileview: &SynapseId) -> String {
        let mut clauses = vec!["type = 'file'".to_string()];
        if !self.path_prefix.is_empty() {
            clauses.push(format!("path LIKE '{}/%'", escape_literal(&self.path_prefix)));
        }
        if let Some(group) = or_group("path", &self.path_like) {
            clauses.push(group);
        }
        if let Some(group) = or_group("name", &self.name_like) {
            clauses.push(group);
        }
        format!(
            "SELECT path, name, id FROM {} WHERE {}",
            fileview,
            clauses.join(" AND ")
        )
    }

    pub fn matches(&self, path: &str, name: &str) -> bool {
        let prefix = format!("{}/%", self.path_prefix);
        (self.path_prefix.is_empty() || like_match(&prefix, path))
            && (self.path_like.is_empty() || self.path_like.iter().any(|p| like_match(p, path)))
            && (self.name_like.is_empty() || self.name_like.iter().any(|p| like_match(p, name)))
    }
}

fn or_group(column: &str, patterns: &[String]) -> Option<String> {
    if patterns.is_empty() {
        return None;
    }
    let parts = patterns
        .iter()
        .map(|pattern| format!("{column} LIKE '{}'", escape_literal(pattern)))
        .collect::<Vec<_>>();
    Some(format!("({})", parts.join(" OR ")))
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Case-sensitive SQL `LIKE` matching.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards() {
        assert!(like_match("%.vcf.gz", "S1_vs_N1.strelka.vcf.gz"));
        assert!(like_match("quant.sf", "quant.sf"));
        assert!(like_match("%/Strelka%/%", "out/VariantCalling/Strelka2/S1/a.vcf.gz"));
        assert!(like_match("syn_", "syn1"));
        assert!(!like_match("%.vcf.gz", "a.vcf.gz.tbi"));
        assert!(!like_match("quant.sf", "quant.sf.gz"));
    }

    #[test]
    fn filter_matches_prefix_and_groups() {
        let filter = IndexFilter::under("proj/out/")
            .path_like("%/Manta%/%")
            .name_like("%.vcf.gz")
            .name_like("%.vcf.gz.tbi");
        assert!(filter.matches("proj/out/VariantCalling/S1/Manta/S1.vcf.gz", "S1.vcf.gz"));
        assert!(filter.matches(
            "proj/out/VariantCalling/S1/Manta/S1.vcf.gz.tbi",
            "S1.vcf.gz.tbi"
        ));
        assert!(!filter.matches("proj/other/S1/Manta/S1.vcf.gz", "S1.vcf.gz"));
        assert!(!filter.matches("proj/out/S1/Strelka/S1.vcf.gz", "S1.vcf.gz"));
    }

    #[test]
    fn sql_rendering_escapes_quotes() {
        let view: SynapseId = "syn42".parse().unwrap();
        let sql = IndexFilter::under("Bob's project/out")
            .name_like("quant.sf")
            .to_sql(&view);
        assert_eq!(
            sql,
            "SELECT path, name, id FROM syn42 WHERE type = 'file' \
             AND path LIKE 'Bob''s project/out/%' AND (name LIKE 'quant.sf')"
        );
    }
}
