mod common;

use miette::{Diagnostic, LabeledSpan};
use serde::Serialize;
use stencil::{
    Context, Engine, ErrorKind, EscapeMode, FilterError, Options, ParseError, RenderError, Syntax,
    UndefinedVariable, Value,
};

#[derive(Serialize)]
struct Item {
    name: String,
    price: f64,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct Order {
    customer: String,
    vip: bool,
    items: Vec<Item>,
}

fn order() -> Order {
    Order {
        customer: "Ada <ada@example.com>".to_string(),
        vip: true,
        items: vec![
            Item {
                name: "pen".to_string(),
                price: 1.5,
                tags: vec!["office".to_string()],
            },
            Item {
                name: "lamp".to_string(),
                price: 20.0,
                tags: vec![],
            },
        ],
    }
}

#[test]
fn test_render_serialized_context() -> anyhow::Result<()> {
    common::init_tracing();
    let engine = Engine::new();
    let ctx = Context::from_serialize(&order())?;

    let src = "\
{{ customer }}{% if vip %} (vip){% endif %}
{% for item in items -%}
{{ loop.index1 }}. {{ item.name | capitalize }} {{ item.price }}{% if item.tags %} [{{ item.tags | join(\", \") }}]{% endif %}
{% endfor -%}
total: {{ items | length }}";

    assert_eq!(
        engine.render_str(src, &ctx)?,
        "Ada &lt;ada@example.com&gt; (vip)\n1. Pen 1.5 [office]\n2. Lamp 20\ntotal: 2"
    );
    Ok(())
}

#[test]
fn test_paths_and_indexing() -> anyhow::Result<()> {
    let engine = Engine::new();
    let ctx = Context::from_serialize(&order())?;

    assert_eq!(engine.render_str("{{ items[1].name }}", &ctx)?, "lamp");
    assert_eq!(engine.render_str("{{ items[0][\"tags\"][0] }}", &ctx)?, "office");
    assert_eq!(engine.render_str("{{ items | first | length }}", &ctx)?, "3");

    let err = engine.render_str("{{ items[5].name }}", &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render(RenderError::UndefinedVariable));
    Ok(())
}

#[test]
fn test_whitespace_control_and_comments() -> anyhow::Result<()> {
    let engine = Engine::new();
    let ctx = Context::new().with("xs", vec![1, 2, 3]);

    let src = "<ul>\n  {%- for x in xs %}\n  <li>{{ x }}</li>\n  {%- endfor %}\n</ul>";
    assert_eq!(
        engine.render_str(src, &ctx)?,
        "<ul>\n  <li>1</li>\n  <li>2</li>\n  <li>3</li>\n</ul>"
    );
    assert_eq!(engine.render_str("a {# note #}b", &ctx)?, "a b");
    assert_eq!(engine.render_str(r"\{{ literal }}", &ctx)?, "{{ literal }}");
    Ok(())
}

#[test]
fn test_include_arguments_and_safe_values() -> anyhow::Result<()> {
    let mut engine = Engine::new();
    engine.add_template("header", "hello, {{ name }}!")?;
    let ctx = Context::from_serialize(&order())?;

    assert_eq!(
        engine.render_str("{% include \"header\" name: customer %}", &ctx)?,
        "hello, Ada &lt;ada@example.com&gt;!"
    );
    assert_eq!(
        engine.render_str(
            "{% let c = customer | safe %}{% include \"header\" name: c %}",
            &ctx
        )?,
        "hello, Ada <ada@example.com>!"
    );

    let err = engine
        .render_str("{% include \"header\" who: customer %}", &ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render(RenderError::UndefinedVariable));
    assert_eq!(err.template(), Some("header"));
    Ok(())
}

#[test]
fn test_arithmetic_and_logic() -> anyhow::Result<()> {
    let engine = Engine::new();
    let ctx = Context::new().with("a", 7).with("b", 2);

    assert_eq!(engine.render_str("{{ a + b * 3 }}", &ctx)?, "13");
    assert_eq!(engine.render_str("{{ (a + b) * 3 }}", &ctx)?, "27");
    assert_eq!(engine.render_str("{{ a / b }} {{ a % b }} {{ -a }}", &ctx)?, "3.5 1 -7");
    assert_eq!(engine.render_str("{{ 'x' + 'y' }}", &ctx)?, "xy");
    assert_eq!(engine.render_str("{{ a > b && !(b == 2) }}", &ctx)?, "false");
    assert_eq!(engine.render_str("{{ a >= 7 and b != 3 }}", &ctx)?, "true");
    assert_eq!(engine.render_str("{{ none | default('-') }}", &ctx)?, "-");
    Ok(())
}

#[test]
fn test_custom_filter_and_options() -> anyhow::Result<()> {
    let mut engine = Engine::new().with_options(
        Options::new()
            .escape_mode(EscapeMode::None)
            .undefined_variable(UndefinedVariable::Lenient),
    );
    engine.add_filter("wrap", |value: &Value, args: &[Value]| {
        let [Value::String(side)] = args else {
            return Err(FilterError::new("expected one string"));
        };
        Ok(Value::from(format!("{side}{value}{side}")))
    });

    let ctx = Context::new().with("name", "<b>");
    assert_eq!(engine.render_str("{{ name | wrap('*') }}", &ctx)?, "*<b>*");
    assert_eq!(engine.render_str("[{{ ghost }}]", &ctx)?, "[]");

    let err = engine.render_str("{{ name | wrap }}", &ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render(RenderError::FilterArgumentError));
    assert_eq!(err.message(), "filter `wrap`: expected one string");
    Ok(())
}

#[test]
fn test_custom_syntax() -> anyhow::Result<()> {
    let syntax = Syntax::default()
        .expression("<<", ">>")
        .block("<%", "%>")
        .comment("<#", "#>");
    let engine = Engine::new().with_options(Options::new().syntax(syntax));
    let ctx = Context::new().with("xs", vec!["a", "b"]);

    assert_eq!(
        engine.render_str("<% for x in xs %><< x >>{{ x }}<% endfor %><# gone #>", &ctx)?,
        "a{{ x }}b{{ x }}"
    );
    Ok(())
}

#[test]
fn test_error_report_points_at_source() {
    let engine = Engine::new();
    let err = engine
        .render_str("line one\nHello, {{ nme }}!", &Context::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Render(RenderError::UndefinedVariable));
    assert_eq!((err.line(), err.column()), (Some(2), Some(11)));
    assert_eq!(err.source_snippet(), Some("Hello, {{ nme }}!"));

    let labels: Vec<LabeledSpan> = err.labels().into_iter().flatten().collect();
    assert_eq!(labels.len(), 1);
    assert_eq!((labels[0].offset(), labels[0].len()), (19, 3));

    let report = err.report();
    assert!(report.contains("render error: undefined variable: `nme` is not defined"));
    assert!(report.contains("stencil::render::undefined_variable"), "{report}");
    assert!(report.contains("[<string>:2:11]"), "{report}");
    assert!(report.contains("Hello, {{ nme }}!"), "{report}");
}

#[test]
fn test_parse_errors_surface_through_engine() {
    let engine = Engine::new();
    let cases = [
        ("{% if x %}", ErrorKind::Parse(ParseError::UnclosedBlock)),
        ("{% endfor %}", ErrorKind::Parse(ParseError::UnmatchedEnd)),
        ("{% frobnicate %}", ErrorKind::Parse(ParseError::UnknownKeyword)),
        ("{{ 1 + }}", ErrorKind::Parse(ParseError::UnexpectedToken)),
        ("x{% extends \"b\" %}", ErrorKind::Parse(ParseError::ExtendsNotFirst)),
    ];
    for (src, kind) in cases {
        let err = engine.render_str(src, &Context::new()).unwrap_err();
        assert_eq!(err.kind(), kind, "{src}");
    }
}
