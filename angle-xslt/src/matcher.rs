//! Mode-scoped template dispatch.
//!
//! A template matches a node when its match pattern, evaluated on some
//! ancestor-or-self anchor, selects that node. The anchor depth plus the
//! shape-derived pattern priority gives the matching score; import
//! precedence, declared priority and declaration order break ties in that
//! order, later declarations winning.

use angle_xml::{Node, QName};
use angle_xpath::{eval, Context, Item, Result};

use crate::stylesheet::{Stylesheet, Template};

impl Stylesheet {
    pub(crate) fn best_template(
        &self,
        ctx: &Context,
        node: Node,
        mode: &str,
    ) -> Result<Option<&Template>> {
        let mut best: Option<(&Template, MatchRank)> = None;
        for template in &self.templates {
            if template.pattern.is_none() || !template.serves_mode(mode) {
                continue;
            }
            let Some(score) = self.match_score(template, ctx, node)? else {
                continue;
            };
            let rank = MatchRank {
                precedence: template.precedence,
                score,
                declared: template.declared_priority.unwrap_or(0.0),
                order: template.order,
            };
            let better = match &best {
                None => true,
                Some((_, current)) => rank.beats(current),
            };
            if better {
                best = Some((template, rank));
            }
        }
        Ok(best.map(|(template, _)| template))
    }

    /// Like [`Stylesheet::best_template`] but restricted to templates with a
    /// lower import precedence, for `apply-imports`.
    pub(crate) fn best_imported_template(
        &self,
        ctx: &Context,
        node: Node,
        mode: &str,
        below: usize,
    ) -> Result<Option<&Template>> {
        let mut best: Option<(&Template, MatchRank)> = None;
        for template in &self.templates {
            if template.precedence >= below
                || template.pattern.is_none()
                || !template.serves_mode(mode)
            {
                continue;
            }
            let Some(score) = self.match_score(template, ctx, node)? else {
                continue;
            };
            let rank = MatchRank {
                precedence: template.precedence,
                score,
                declared: template.declared_priority.unwrap_or(0.0),
                order: template.order,
            };
            let better = match &best {
                None => true,
                Some((_, current)) => rank.beats(current),
            };
            if better {
                best = Some((template, rank));
            }
        }
        Ok(best.map(|(template, _)| template))
    }

    /// The score of a template against a node: the deepest ancestor-or-self
    /// anchor whose pattern evaluation selects the node, plus the pattern's
    /// base priority. `None` when no anchor matches.
    fn match_score(&self, template: &Template, ctx: &Context, node: Node) -> Result<Option<f64>> {
        let Some(pattern) = template.pattern.as_ref() else {
            return Ok(None);
        };
        let chain: Vec<Node> = {
            let arena = ctx.arena.borrow();
            let mut chain = Vec::new();
            let mut current = Some(node);
            while let Some(n) = current {
                chain.push(n);
                current = arena.parent(n);
            }
            chain
        };
        let mut best: Option<f64> = None;
        for (height, anchor) in chain.iter().enumerate() {
            let depth = (chain.len() - 1 - height) as f64;
            let anchored = ctx.sub(Item::Node(*anchor), 1, 1);
            let selected = eval(pattern, &anchored)?;
            let hit = selected
                .iter()
                .any(|item| matches!(item, Item::Node(n) if *n == node));
            if hit {
                let score = depth + template.base_priority;
                if best.map(|b| score > b).unwrap_or(true) {
                    best = Some(score);
                }
            }
        }
        Ok(best)
    }

    /// Resolve a named template; on duplicates the highest precedence and
    /// latest declaration wins.
    pub(crate) fn named_template(&self, name: &QName) -> Option<&Template> {
        self.templates
            .iter()
            .rev()
            .filter(|t| t.name.as_ref() == Some(name))
            .max_by_key(|t| (t.precedence, t.order))
    }
}

struct MatchRank {
    precedence: usize,
    score: f64,
    declared: f64,
    order: usize,
}

impl MatchRank {
    fn beats(&self, other: &MatchRank) -> bool {
        if self.precedence != other.precedence {
            return self.precedence > other.precedence;
        }
        if self.score != other.score {
            return self.score > other.score;
        }
        if self.declared != other.declared {
            return self.declared > other.declared;
        }
        self.order >= other.order
    }
}
