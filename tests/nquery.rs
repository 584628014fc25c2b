//! nquery parsing through the public API and custom expression handlers

mod common;

use common::{RecordingRunner, shop_schema};
use nquery_engine::nquery::{
    self, Argument, ArgumentCursor, DefaultExpressionHandler, ExpressionStatementHandler,
    Operand, Query,
};
use nquery_engine::query::{BooleanOperator, ComparisonOperator, Expression, NodeKind};
use nquery_engine::sql::SqlValue;
use nquery_engine::{AttributeValue, Engine, EngineConfig, RecordContext};

/// Accepts `<path> IS EMPTY` on top of the default expressions
struct EmptyCheckHandler;

impl ExpressionStatementHandler for EmptyCheckHandler {
    fn handle(
        &self,
        text: &str,
        next_operator: Option<BooleanOperator>,
        arguments: &mut ArgumentCursor<'_>,
    ) -> nquery_engine::Result<Expression<Operand>> {
        match text.trim().strip_suffix(" IS EMPTY") {
            Some(path) => Ok(Expression::new(
                Operand::Path(path.trim().to_string()),
                ComparisonOperator::Equal,
                Operand::Argument(Argument::Value(AttributeValue::Null)),
            )),
            None => DefaultExpressionHandler.handle(text, next_operator, arguments),
        }
    }
}

#[test]
fn test_parse_full_pick() {
    let query = nquery::parse(
        "PICK Customer c IF c.name = ? AND (c.email = ? OR ? < c.id) ORDERBY c.name DESC LIMIT ? OFFSET 20",
        &[
            Argument::from("Ada"),
            Argument::from("ada@example.com"),
            Argument::from(100),
            Argument::from(5),
        ],
    )
    .unwrap();

    assert_eq!(query.holder(), "Customer");
    assert_eq!(query.alias(), Some("c"));
    let Query::Pick(pick) = query else {
        panic!("expected PICK");
    };
    assert_eq!(pick.limit, Some(5));
    assert_eq!(pick.offset, Some(20));
    assert!(pick.order_by.as_ref().unwrap().descending);

    let criteria = &pick.criteria;
    let top: Vec<_> = criteria.chain(criteria.root()).collect();
    assert_eq!(top.len(), 2);
    assert_eq!(
        criteria.node(top[0]).next_operator,
        Some(BooleanOperator::And)
    );
    let NodeKind::Wrapper { wrapped, closed } = &criteria.node(top[1]).kind else {
        panic!("expected a group");
    };
    assert!(*closed);
    let inner: Vec<_> = criteria.chain(*wrapped).collect();
    assert_eq!(inner.len(), 2);
    assert_eq!(
        criteria.node(inner[0]).next_operator,
        Some(BooleanOperator::Or)
    );
    let NodeKind::Expression(last) = &criteria.node(inner[1]).kind else {
        panic!("expected an expression");
    };
    assert_eq!(last.left, Operand::Argument(Argument::from(100)));
    assert_eq!(last.right, Operand::Path("c.id".to_string()));
}

#[test]
fn test_parse_errors_are_query_parsing_errors() {
    for (text, arguments) in [
        ("", vec![]),
        ("SELECT Customer", vec![]),
        ("PICK Customer IF", vec![]),
        ("PICK Customer IF name = ? AND", vec![Argument::from("x")]),
        ("PICK Customer IF (name = ?", vec![Argument::from("x")]),
        ("PICK Customer IF name = ?)", vec![Argument::from("x")]),
        ("PICK Customer LIMIT 1 ORDERBY name", vec![]),
        ("COUNT Customer ORDERBY name", vec![]),
        ("PICK Customer IF name = ?", vec![]),
        ("PICK Customer", vec![Argument::from("unused")]),
        ("PICK Customer IF name >< ?", vec![Argument::from("x")]),
    ] {
        let err = nquery::parse(text, &arguments).unwrap_err();
        assert!(err.is_query_parsing(), "{:?}: {}", text, err);
    }
}

#[tokio::test]
async fn test_engine_uses_custom_expression_handler() {
    common::init_tracing();
    let engine = Engine::new(shop_schema(), EngineConfig::default())
        .unwrap()
        .with_expression_handler(EmptyCheckHandler);
    let mut runner = RecordingRunner::new();
    let mut ctx = RecordContext::new();

    let parsed = engine
        .parse("COUNT Line IF sku IS EMPTY", &[])
        .unwrap();
    assert!(matches!(parsed, Query::Count(_)));

    engine
        .accessor(&mut runner)
        .query(
            &mut ctx,
            "PICK Line l IF l.sku IS EMPTY OR l.quantity > ?",
            &[Argument::from(2)],
        )
        .await
        .unwrap();

    let statement = &runner.statements[0];
    assert!(statement
        .sql
        .ends_with(r#"WHERE "t"."SKU" IS NULL OR "t"."QUANTITY" > $1"#));
    assert_eq!(statement.params, vec![SqlValue::BigInt(2)]);
    assert!(nquery::parse("PICK Line IF sku IS EMPTY", &[]).is_err());
}

#[test]
fn test_null_argument_is_kept_as_value() {
    let query = nquery::parse("PICK Line IF sku = ?", &[Argument::from(AttributeValue::Null)]).unwrap();
    let Query::Pick(pick) = query else {
        panic!("expected PICK");
    };
    let expression = pick.criteria.expressions().next().unwrap();
    assert_eq!(
        expression.right,
        Operand::Argument(Argument::Value(AttributeValue::Null))
    );
}
