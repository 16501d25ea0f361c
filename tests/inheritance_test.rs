mod common;

use stencil::{
    BlockOverride, Context, Engine, ErrorKind, InheritanceError, MemoryLoader, Options,
};

fn site() -> MemoryLoader {
    MemoryLoader::new()
        .with(
            "base.html",
            "<html><head><title>{% block title %}Site{% endblock %}</title></head>\
             <body>{% include \"nav.html\" %}{% block body %}{% endblock %}</body></html>",
        )
        .with("nav.html", "<nav>{% for link in links %}[{{ link }}]{% endfor %}</nav>")
        .with(
            "section.html",
            "{% extends \"base.html\" %}\
             {% block body %}<main>{% block content %}empty{% endblock %}</main>{% endblock %}",
        )
        .with(
            "article.html",
            "{% extends \"section.html\" %}\
             {% block title %}{{ title | upper }}{% endblock %}\
             {% block content %}{% let words = body | length %}{{ body }} ({{ words }}){% endblock %}",
        )
}

fn context() -> Context {
    Context::new()
        .with("links", vec!["home", "blog"])
        .with("title", "news")
        .with("body", "hello")
}

#[test]
fn test_three_level_inheritance_with_include() -> anyhow::Result<()> {
    common::init_tracing();
    let engine = Engine::with_loader(site());

    assert_eq!(
        engine.render("article.html", &context())?,
        "<html><head><title>NEWS</title></head>\
         <body><nav>[home][blog]</nav><main>hello (5)</main></body></html>"
    );
    assert_eq!(
        engine.render("section.html", &context())?,
        "<html><head><title>Site</title></head>\
         <body><nav>[home][blog]</nav><main>empty</main></body></html>"
    );
    Ok(())
}

#[test]
fn test_resolved_template_is_flat() -> anyhow::Result<()> {
    let engine = Engine::with_loader(site());
    let resolved = engine.get_template("article.html")?;

    assert_eq!(resolved.name(), "article.html");
    assert_eq!(resolved.source().name(), "base.html");
    let text = resolved.to_string();
    assert!(!text.contains("extends"));
    assert!(text.contains("{% block title %}{{ (title | upper) }}{% endblock %}"));
    Ok(())
}

#[test]
fn test_cyclic_extends_is_reported_before_rendering() {
    let loader = MemoryLoader::new()
        .with("a", "{% extends \"b\" %}")
        .with("b", "{% extends \"a\" %}");
    let engine = Engine::with_loader(loader);

    let err = engine.render("a", &Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inheritance(InheritanceError::CyclicExtends));
    assert!(engine.get_template("b").is_err());
}

#[test]
fn test_missing_parent_and_include() {
    let loader = MemoryLoader::new()
        .with("orphan", "{% extends \"gone\" %}")
        .with("page", "a\n  {% include \"missing\" %}");
    let engine = Engine::with_loader(loader);

    let err = engine.render("orphan", &Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inheritance(InheritanceError::MissingParent));
    assert_eq!(err.message(), "template `gone` not found");

    let err = engine.render("page", &Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inheritance(InheritanceError::MissingParent));
    assert_eq!(err.template(), Some("page"));
    assert_eq!((err.line(), err.column()), (Some(2), Some(3)));
}

#[test]
fn test_block_override_modes() -> anyhow::Result<()> {
    let loader = MemoryLoader::new()
        .with("base", "[{% block a %}A{% endblock %}]")
        .with("child", "{% extends \"base\" %}{% block a %}a{% endblock %}{% block extra %}+{% endblock %}");

    let strict = Engine::with_loader(loader.clone());
    let err = strict.render("child", &Context::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inheritance(InheritanceError::UnknownBlockOverride));

    let lenient = Engine::with_loader(loader)
        .with_options(Options::new().block_override(BlockOverride::Lenient));
    assert_eq!(lenient.render("child", &Context::new())?, "[a]+");
    Ok(())
}

#[test]
fn test_render_errors_name_the_authoring_template() {
    let loader = MemoryLoader::new()
        .with("base", "{% block body %}{% endblock %}{% include \"footer\" %}")
        .with("footer", "\n\n{{ year + 'x' }}")
        .with("page", "{% extends \"base\" %}{% block body %}ok{% endblock %}");
    let engine = Engine::with_loader(loader);

    let err = engine
        .render("page", &Context::new().with("year", 2024))
        .unwrap_err();
    assert_eq!(err.template(), Some("footer"));
    assert_eq!(err.line(), Some(3));
}
