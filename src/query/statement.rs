//! Boolean statements
//!
//! A [`BooleanStatement`] is an arena of nodes. Each node is either an
//! expression (`left <op> right`) or a wrapper grouping a nested chain. Nodes
//! of one level are linked through `next`, carrying the boolean operator that
//! joins them to their successor. The operand type is generic so the parser
//! (attribute paths and arguments) and the SQL layer (columns and values)
//! share one structure.

use std::fmt;

/// Comparison operator of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    Greater,
    GreaterEqual,
    Lower,
    LowerEqual,
    /// Inclusive range test, the right operand is a range
    InRange,
}

impl ComparisonOperator {
    /// Operators as written in nquery text, longest symbols first
    pub const SYMBOLS: [(&'static str, ComparisonOperator); 6] = [
        (">=", ComparisonOperator::GreaterEqual),
        ("<=", ComparisonOperator::LowerEqual),
        ("><", ComparisonOperator::InRange),
        ("=", ComparisonOperator::Equal),
        (">", ComparisonOperator::Greater),
        ("<", ComparisonOperator::Lower),
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::Greater => ">",
            ComparisonOperator::GreaterEqual => ">=",
            ComparisonOperator::Lower => "<",
            ComparisonOperator::LowerEqual => "<=",
            ComparisonOperator::InRange => "><",
        }
    }

    /// Operator for the same comparison with its operands swapped
    pub fn mirrored(&self) -> Self {
        match self {
            ComparisonOperator::Greater => ComparisonOperator::Lower,
            ComparisonOperator::GreaterEqual => ComparisonOperator::LowerEqual,
            ComparisonOperator::Lower => ComparisonOperator::Greater,
            ComparisonOperator::LowerEqual => ComparisonOperator::GreaterEqual,
            other => *other,
        }
    }
}

/// Operator joining a node to its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOperator {
    And,
    Or,
}

impl BooleanOperator {
    pub fn keyword(&self) -> &'static str {
        match self {
            BooleanOperator::And => "AND",
            BooleanOperator::Or => "OR",
        }
    }
}

impl fmt::Display for BooleanOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A single comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Expression<O> {
    pub left: O,
    pub operator: ComparisonOperator,
    pub right: O,
}

impl<O> Expression<O> {
    pub fn new(left: O, operator: ComparisonOperator, right: O) -> Self {
        Self {
            left,
            operator,
            right,
        }
    }
}

/// Index of a node inside its statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind<O> {
    Expression(Expression<O>),
    /// Parenthesized group; `closed` turns true once the group has ended
    Wrapper {
        wrapped: Option<NodeId>,
        closed: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode<O> {
    pub kind: NodeKind<O>,
    pub next: Option<NodeId>,
    pub next_operator: Option<BooleanOperator>,
}

/// Arena-backed boolean expression tree
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanStatement<O> {
    nodes: Vec<StatementNode<O>>,
    root: Option<NodeId>,
}

impl<O> Default for BooleanStatement<O> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }
}

impl<O> BooleanStatement<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statement consisting of a single expression
    pub fn from_expression(expression: Expression<O>) -> Self {
        let mut statement = Self::new();
        let id = statement.add_expression(expression);
        statement.root = Some(id);
        statement
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn node(&self, id: NodeId) -> &StatementNode<O> {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StatementNode<O> {
        &mut self.nodes[id.0]
    }

    /// Add an unlinked expression node
    pub fn add_expression(&mut self, expression: Expression<O>) -> NodeId {
        self.add_node(NodeKind::Expression(expression))
    }

    /// Add an unlinked, open wrapper node
    pub fn add_wrapper(&mut self) -> NodeId {
        self.add_node(NodeKind::Wrapper {
            wrapped: None,
            closed: false,
        })
    }

    fn add_node(&mut self, kind: NodeKind<O>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(StatementNode {
            kind,
            next: None,
            next_operator: None,
        });
        id
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// Append an expression to the end of the top-level chain
    pub fn append(&mut self, operator: BooleanOperator, expression: Expression<O>) -> NodeId {
        let id = self.add_expression(expression);
        let last = self.chain(self.root).last();
        match last {
            Some(last) => {
                let node = self.node_mut(last);
                node.next = Some(id);
                node.next_operator = Some(operator);
            }
            None => self.root = Some(id),
        }
        id
    }

    /// Node ids of a chain, following `next` links from `start`
    pub fn chain(&self, start: Option<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(start, move |id| self.nodes[id.0].next)
    }

    /// All expressions, in insertion order
    pub fn expressions(&self) -> impl Iterator<Item = &Expression<O>> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Expression(e) => Some(e),
            NodeKind::Wrapper { .. } => None,
        })
    }

    /// Convert every expression, keeping the node structure
    pub fn try_map<P, E>(
        self,
        mut f: impl FnMut(Expression<O>) -> Result<Expression<P>, E>,
    ) -> Result<BooleanStatement<P>, E> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            let kind = match node.kind {
                NodeKind::Expression(e) => NodeKind::Expression(f(e)?),
                NodeKind::Wrapper { wrapped, closed } => NodeKind::Wrapper { wrapped, closed },
            };
            nodes.push(StatementNode {
                kind,
                next: node.next,
                next_operator: node.next_operator,
            });
        }
        Ok(BooleanStatement {
            nodes,
            root: self.root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_builds_chain() {
        let mut statement = BooleanStatement::from_expression(Expression::new(
            "a",
            ComparisonOperator::Equal,
            "1",
        ));
        statement.append(
            BooleanOperator::Or,
            Expression::new("b", ComparisonOperator::Greater, "2"),
        );

        let chain: Vec<NodeId> = statement.chain(statement.root()).collect();
        assert_eq!(chain.len(), 2);
        assert_eq!(
            statement.node(chain[0]).next_operator,
            Some(BooleanOperator::Or)
        );
        assert_eq!(statement.node(chain[1]).next_operator, None);
    }

    #[test]
    fn test_try_map_keeps_structure() {
        let mut statement = BooleanStatement::new();
        let wrapper = statement.add_wrapper();
        let inner = statement.add_expression(Expression::new(1, ComparisonOperator::Lower, 2));
        statement.set_root(wrapper);
        statement.node_mut(wrapper).kind = NodeKind::Wrapper {
            wrapped: Some(inner),
            closed: true,
        };

        let mapped: BooleanStatement<String> = statement
            .try_map(|e: Expression<i32>| {
                Ok::<_, ()>(Expression::new(e.left.to_string(), e.operator, e.right.to_string()))
            })
            .unwrap();
        assert_eq!(mapped.root(), Some(wrapper));
        let e = mapped.expressions().next().unwrap();
        assert_eq!(e.left, "1");
        assert_eq!(e.right, "2");
    }

    #[test]
    fn test_symbols_longest_first() {
        let lengths: Vec<usize> = ComparisonOperator::SYMBOLS
            .iter()
            .map(|(s, _)| s.len())
            .collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
    }
}
