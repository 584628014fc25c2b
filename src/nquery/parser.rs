//! Pushdown automaton over nquery text
//!
//! Characters are fed one at a time to the state on top of the stack. A state
//! answers with a [`Step`]: keep going, push a child state, pop itself, or
//! hand text back to the front of the input so the next state sees it again.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use super::handler::{ArgumentCursor, ExpressionStatementHandler};
use super::read_ahead::{EndOfInput, ReservedWordReadAhead, StopWordMatch};
use super::{Argument, Count, Operand, OrderBy, Pick, Query};
use crate::error::{EngineError, Result};
use crate::query::{BooleanOperator, BooleanStatement, Expression, NodeId, NodeKind};
use crate::record::AttributeValue;
use crate::sql::validate_holder_name;

fn error(message: impl Into<String>) -> EngineError {
    EngineError::query_parsing(message)
}

const CLAUSES: [&str; 4] = ["IF", "ORDERBY", "LIMIT", "OFFSET"];

fn clause_rank(word: &str) -> Option<u8> {
    CLAUSES
        .iter()
        .position(|c| *c == word)
        .map(|i| i as u8 + 1)
}

enum Step {
    Consumed,
    Push(State),
    PushAndReparse(State, String),
    Pop,
    PopAndReparse(String),
    Reparse(String),
}

enum State {
    Root(RootState),
    Select(SelectState),
    If(IfState),
    Statement(StatementState),
    OrderBy(OrderByState),
    Number(NumberState),
}

impl State {
    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        match self {
            State::Root(s) => s.feed(c, context),
            State::Select(s) => s.feed(c, context),
            State::If(s) => s.feed(c),
            State::Statement(s) => s.feed(c, context),
            State::OrderBy(s) => s.feed(c, context),
            State::Number(s) => s.feed(c, context),
        }
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        match self {
            State::Root(s) => s.finish(context),
            State::Select(s) => s.finish(context),
            State::If(s) => s.finish(),
            State::Statement(s) => s.finish(context),
            State::OrderBy(s) => s.finish(context),
            State::Number(s) => s.finish(context),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Pick,
    Count,
}

/// Everything the states build up while parsing
struct Context<'a> {
    handler: &'a dyn ExpressionStatementHandler,
    arguments: ArgumentCursor<'a>,
    kind: Option<Kind>,
    holder: Option<String>,
    alias: Option<String>,
    statement: StatementBuilder,
    order_by: Option<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

pub(super) struct Parser<'a> {
    context: Context<'a>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(handler: &'a dyn ExpressionStatementHandler, arguments: &'a [Argument]) -> Self {
        Self {
            context: Context {
                handler,
                arguments: ArgumentCursor::new(arguments),
                kind: None,
                holder: None,
                alias: None,
                statement: StatementBuilder::default(),
                order_by: None,
                limit: None,
                offset: None,
            },
        }
    }

    pub(super) fn parse(mut self, text: &str) -> Result<Query> {
        let mut input: VecDeque<char> = text.chars().collect();
        let mut stack = vec![State::Root(RootState::default())];

        loop {
            let step = match (input.pop_front(), stack.last_mut()) {
                (Some(c), Some(state)) => state.feed(c, &mut self.context)?,
                (Some(c), None) => {
                    return Err(error(format!("Unexpected '{}' after end of query", c)));
                }
                (None, Some(state)) => state.finish(&mut self.context)?,
                (None, None) => break,
            };
            match step {
                Step::Consumed => {}
                Step::Push(state) => stack.push(state),
                Step::PushAndReparse(state, text) => {
                    stack.push(state);
                    reparse(&mut input, &text);
                }
                Step::Pop => {
                    stack.pop();
                }
                Step::PopAndReparse(text) => {
                    stack.pop();
                    reparse(&mut input, &text);
                }
                Step::Reparse(text) => reparse(&mut input, &text),
            }
        }

        self.build()
    }

    fn build(self) -> Result<Query> {
        let context = self.context;
        if context.arguments.remaining() > 0 {
            return Err(error(format!(
                "{} argument(s) left without placeholder",
                context.arguments.remaining()
            )));
        }
        let kind = context.kind.ok_or_else(|| error("Empty query"))?;
        let holder = context
            .holder
            .ok_or_else(|| error("Missing attribute holder name"))?;
        let criteria = context.statement.into_statement();
        debug!(holder = %holder, ?kind, "Parsed nquery");
        Ok(match kind {
            Kind::Pick => Query::Pick(Pick {
                holder,
                alias: context.alias,
                criteria,
                order_by: context.order_by,
                limit: context.limit,
                offset: context.offset,
            }),
            Kind::Count => Query::Count(Count {
                holder,
                alias: context.alias,
                criteria,
            }),
        })
    }
}

fn reparse(input: &mut VecDeque<char>, text: &str) {
    for c in text.chars().rev() {
        input.push_front(c);
    }
}

// ============================================================================
// Keyword states
// ============================================================================

/// Expects `PICK` or `COUNT`
#[derive(Default)]
struct RootState {
    word: String,
}

impl RootState {
    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        if !c.is_whitespace() {
            self.word.push(c);
            return Ok(Step::Consumed);
        }
        if self.word.is_empty() {
            return Ok(Step::Consumed);
        }
        let word = std::mem::take(&mut self.word);
        self.keyword(&word, context)
    }

    fn keyword(&mut self, word: &str, context: &mut Context<'_>) -> Result<Step> {
        let kind = match word {
            "PICK" => Kind::Pick,
            "COUNT" => Kind::Count,
            other => return Err(error(format!("Unknown keyword '{}'", other))),
        };
        context.kind = Some(kind);
        Ok(Step::Push(State::Select(SelectState::new(kind))))
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            return self.keyword(&word, context);
        }
        if context.kind.is_none() {
            return Err(error("Empty query"));
        }
        Ok(Step::Pop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectPhase {
    Holder,
    Alias,
    Clauses,
}

/// Holder name, optional alias and the clause keywords
struct SelectState {
    kind: Kind,
    word: String,
    phase: SelectPhase,
    last_rank: u8,
}

impl SelectState {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            word: String::new(),
            phase: SelectPhase::Holder,
            last_rank: 0,
        }
    }

    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        if c.is_alphanumeric() {
            self.word.push(c);
            return Ok(Step::Consumed);
        }
        let child = if self.word.is_empty() {
            None
        } else {
            let word = std::mem::take(&mut self.word);
            self.word_done(&word, context)?
        };
        match (child, c.is_whitespace()) {
            (Some(state), true) => Ok(Step::Push(state)),
            (None, true) => Ok(Step::Consumed),
            (Some(state), false) => Ok(Step::PushAndReparse(state, c.to_string())),
            (None, false) => Err(error(format!("Unexpected character '{}'", c))),
        }
    }

    fn word_done(&mut self, word: &str, context: &mut Context<'_>) -> Result<Option<State>> {
        match self.phase {
            SelectPhase::Holder => {
                validate_holder_name(word).map_err(error)?;
                context.holder = Some(word.to_string());
                self.phase = SelectPhase::Alias;
                Ok(None)
            }
            SelectPhase::Alias if clause_rank(word).is_none() => {
                let valid = word.starts_with(|c: char| c.is_ascii_lowercase())
                    && word.chars().all(|c| c.is_ascii_alphanumeric());
                if !valid {
                    return Err(error(format!("Invalid alias '{}'", word)));
                }
                context.alias = Some(word.to_string());
                self.phase = SelectPhase::Clauses;
                Ok(None)
            }
            SelectPhase::Alias | SelectPhase::Clauses => self.clause(word).map(Some),
        }
    }

    fn clause(&mut self, word: &str) -> Result<State> {
        let rank = clause_rank(word).ok_or_else(|| error(format!("Unknown keyword '{}'", word)))?;
        if self.kind == Kind::Count && rank > 1 {
            return Err(error(format!("'{}' is not allowed in COUNT", word)));
        }
        if rank <= self.last_rank {
            return Err(error(format!("Unexpected '{}'", word)));
        }
        self.last_rank = rank;
        self.phase = SelectPhase::Clauses;
        Ok(match word {
            "IF" => State::If(IfState::default()),
            "ORDERBY" => State::OrderBy(OrderByState::default()),
            "LIMIT" => State::Number(NumberState::new(NumberClause::Limit)),
            _ => State::Number(NumberState::new(NumberClause::Offset)),
        })
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            if let Some(state) = self.word_done(&word, context)? {
                return Ok(Step::Push(state));
            }
        }
        if context.holder.is_none() {
            return Err(error("Missing attribute holder name"));
        }
        Ok(Step::Pop)
    }
}

/// Starts the boolean statement, then hands the next clause back
#[derive(Default)]
struct IfState {
    started: bool,
}

impl IfState {
    fn feed(&mut self, c: char) -> Result<Step> {
        if self.started {
            return Ok(Step::PopAndReparse(c.to_string()));
        }
        if c.is_whitespace() {
            return Ok(Step::Consumed);
        }
        self.started = true;
        Ok(Step::PushAndReparse(
            State::Statement(StatementState::default()),
            c.to_string(),
        ))
    }

    fn finish(&mut self) -> Result<Step> {
        if !self.started {
            return Err(error("IF without condition"));
        }
        Ok(Step::Pop)
    }
}

// ============================================================================
// Boolean statement
// ============================================================================

#[derive(Default)]
struct StatementState {
    read_ahead: ReservedWordReadAhead,
}

impl StatementState {
    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        match self.read_ahead.push(c) {
            Some(stop) => self.stop_word(stop, context),
            None => Ok(Step::Consumed),
        }
    }

    fn stop_word(&mut self, stop: StopWordMatch, context: &mut Context<'_>) -> Result<Step> {
        let next_operator = match stop.word {
            "AND" => Some(BooleanOperator::And),
            "OR" => Some(BooleanOperator::Or),
            _ => None,
        };
        let preceding = stop.preceding.trim();
        if !preceding.is_empty() {
            if stop.word == "(" {
                return Err(error(format!("Unexpected '(' after '{}'", preceding)));
            }
            context.expression(preceding, next_operator)?;
        }

        match (stop.word, next_operator) {
            ("(", _) => context.statement.open_group()?,
            (")", _) => context.statement.close_group()?,
            (_, Some(operator)) => context.statement.set_operator(operator)?,
            (clause, None) => {
                context.statement.finish()?;
                return Ok(Step::PopAndReparse(format!("{}{}", clause, stop.trailing)));
            }
        }
        if stop.trailing.is_empty() {
            Ok(Step::Consumed)
        } else {
            Ok(Step::Reparse(stop.trailing))
        }
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        match self.read_ahead.finish() {
            EndOfInput::StopWord(stop) => match self.stop_word(stop, context)? {
                Step::Consumed => {}
                other => return Ok(other),
            },
            EndOfInput::Text(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    context.expression(text, None)?;
                }
            }
        }
        context.statement.finish()?;
        Ok(Step::Pop)
    }
}

impl Context<'_> {
    fn expression(&mut self, text: &str, next_operator: Option<BooleanOperator>) -> Result<()> {
        let expression = self
            .handler
            .handle(text, next_operator, &mut self.arguments)?;
        self.statement.push_expression(expression)
    }
}

/// Links statement nodes through a stack of the last node of every open level
#[derive(Default)]
struct StatementBuilder {
    statement: BooleanStatement<Operand>,
    chain: Vec<NodeId>,
    pending: Option<BooleanOperator>,
}

impl StatementBuilder {
    fn is_open_group(&self, id: NodeId) -> bool {
        matches!(
            self.statement.node(id).kind,
            NodeKind::Wrapper { closed: false, .. }
        )
    }

    fn push_expression(&mut self, expression: Expression<Operand>) -> Result<()> {
        let id = self.statement.add_expression(expression);
        self.push_node(id)
    }

    fn open_group(&mut self) -> Result<()> {
        let id = self.statement.add_wrapper();
        self.push_node(id)
    }

    fn push_node(&mut self, id: NodeId) -> Result<()> {
        match self.chain.last().copied() {
            None => {
                if !self.statement.is_empty() {
                    return Err(error("Missing boolean operator"));
                }
                self.statement.set_root(id);
                self.chain.push(id);
            }
            Some(top) if self.is_open_group(top) => {
                self.statement.node_mut(top).kind = NodeKind::Wrapper {
                    wrapped: Some(id),
                    closed: false,
                };
                self.chain.push(id);
            }
            Some(top) => {
                let operator = self
                    .pending
                    .take()
                    .ok_or_else(|| error("Missing boolean operator"))?;
                let node = self.statement.node_mut(top);
                node.next = Some(id);
                node.next_operator = Some(operator);
                if let Some(last) = self.chain.last_mut() {
                    *last = id;
                }
            }
        }
        Ok(())
    }

    fn set_operator(&mut self, operator: BooleanOperator) -> Result<()> {
        let top = self
            .chain
            .last()
            .copied()
            .ok_or_else(|| error(format!("Unexpected '{}'", operator)))?;
        if self.is_open_group(top) || self.pending.is_some() {
            return Err(error(format!("Unexpected '{}'", operator)));
        }
        self.pending = Some(operator);
        Ok(())
    }

    fn close_group(&mut self) -> Result<()> {
        if let Some(operator) = self.pending {
            return Err(error(format!("Dangling boolean operator '{}'", operator)));
        }
        let top = self
            .chain
            .last()
            .copied()
            .ok_or_else(|| error("Group closed before it was opened"))?;
        if self.is_open_group(top) {
            return Err(error("Empty group"));
        }
        self.chain.pop();
        let wrapper = self
            .chain
            .last()
            .copied()
            .filter(|w| self.is_open_group(*w))
            .ok_or_else(|| error("Group closed before it was opened"))?;
        if let NodeKind::Wrapper { closed, .. } = &mut self.statement.node_mut(wrapper).kind {
            *closed = true;
        }
        Ok(())
    }

    fn finish(&self) -> Result<()> {
        if let Some(operator) = self.pending {
            return Err(error(format!("Dangling boolean operator '{}'", operator)));
        }
        if self.chain.iter().any(|id| self.is_open_group(*id)) {
            return Err(error("Unterminated group"));
        }
        if self.statement.is_empty() {
            return Err(error("Empty boolean statement"));
        }
        Ok(())
    }

    fn into_statement(self) -> BooleanStatement<Operand> {
        self.statement
    }
}

// ============================================================================
// ORDERBY, LIMIT and OFFSET
// ============================================================================

#[derive(Default)]
struct OrderByState {
    word: String,
    path: Option<String>,
    descending: Option<bool>,
}

impl OrderByState {
    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        if !c.is_whitespace() {
            self.word.push(c);
            return Ok(Step::Consumed);
        }
        if self.word.is_empty() {
            return Ok(Step::Consumed);
        }
        let word = std::mem::take(&mut self.word);
        self.word_done(word, context)
    }

    fn word_done(&mut self, word: String, context: &mut Context<'_>) -> Result<Step> {
        if self.path.is_none() {
            let valid = word.starts_with(|c: char| c.is_ascii_alphabetic())
                && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '.');
            if !valid || clause_rank(&word).is_some() || word == "ASC" || word == "DESC" {
                return Err(error("ORDERBY requires an attribute path"));
            }
            self.path = Some(word);
            return Ok(Step::Consumed);
        }
        if self.descending.is_none() && (word == "ASC" || word == "DESC") {
            self.descending = Some(word == "DESC");
            return Ok(Step::Consumed);
        }
        self.complete(context)?;
        Ok(Step::PopAndReparse(format!("{} ", word)))
    }

    fn complete(&mut self, context: &mut Context<'_>) -> Result<()> {
        let path = self
            .path
            .take()
            .ok_or_else(|| error("ORDERBY requires an attribute path"))?;
        context.order_by = Some(OrderBy {
            path,
            descending: self.descending.unwrap_or(false),
        });
        Ok(())
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            if let Step::PopAndReparse(text) = self.word_done(word, context)? {
                return Ok(Step::PopAndReparse(text));
            }
        }
        self.complete(context)?;
        Ok(Step::Pop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumberClause {
    Limit,
    Offset,
}

impl NumberClause {
    fn keyword(&self) -> &'static str {
        match self {
            NumberClause::Limit => "LIMIT",
            NumberClause::Offset => "OFFSET",
        }
    }
}

struct NumberState {
    clause: NumberClause,
    word: String,
    value: Option<u64>,
}

impl NumberState {
    fn new(clause: NumberClause) -> Self {
        Self {
            clause,
            word: String::new(),
            value: None,
        }
    }

    fn feed(&mut self, c: char, context: &mut Context<'_>) -> Result<Step> {
        if !c.is_whitespace() {
            self.word.push(c);
            return Ok(Step::Consumed);
        }
        if self.word.is_empty() {
            return Ok(Step::Consumed);
        }
        let word = std::mem::take(&mut self.word);
        self.word_done(word, context)
    }

    fn word_done(&mut self, word: String, context: &mut Context<'_>) -> Result<Step> {
        if self.value.is_some() {
            self.complete(context)?;
            return Ok(Step::PopAndReparse(format!("{} ", word)));
        }
        let value = if word == "?" {
            match context.arguments.next_argument()? {
                Argument::Value(AttributeValue::Decimal(d))
                    if d.fract().is_zero() && !d.is_sign_negative() =>
                {
                    d.to_u64()
                }
                _ => None,
            }
        } else {
            word.parse::<u64>().ok()
        };
        let value = value.ok_or_else(|| {
            error(format!(
                "{} requires a non-negative whole number, got '{}'",
                self.clause.keyword(),
                word
            ))
        })?;
        self.value = Some(value);
        Ok(Step::Consumed)
    }

    fn complete(&mut self, context: &mut Context<'_>) -> Result<()> {
        let value = self
            .value
            .ok_or_else(|| error(format!("{} requires a value", self.clause.keyword())))?;
        match self.clause {
            NumberClause::Limit => context.limit = Some(value),
            NumberClause::Offset => context.offset = Some(value),
        }
        Ok(())
    }

    fn finish(&mut self, context: &mut Context<'_>) -> Result<Step> {
        if !self.word.is_empty() {
            let word = std::mem::take(&mut self.word);
            if let Step::PopAndReparse(text) = self.word_done(word, context)? {
                return Ok(Step::PopAndReparse(text));
            }
        }
        self.complete(context)?;
        Ok(Step::Pop)
    }
}
