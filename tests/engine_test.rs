mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stencil::{Context, Engine, Loader, MemoryLoader};

struct CountingLoader {
    inner: MemoryLoader,
    loads: Arc<AtomicUsize>,
}

impl Loader for CountingLoader {
    fn load(&self, name: &str) -> Option<String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(name)
    }
}

fn counting(inner: MemoryLoader) -> (Engine, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = CountingLoader {
        inner,
        loads: loads.clone(),
    };
    (Engine::with_loader(loader), loads)
}

#[test]
fn test_added_templates_shadow_loader() -> anyhow::Result<()> {
    common::init_tracing();
    let (mut engine, loads) = counting(MemoryLoader::new().with("page", "from loader"));
    engine.add_template("page", "added")?;

    assert_eq!(engine.render("page", &Context::new())?, "added");
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_cache_shares_resolution() -> anyhow::Result<()> {
    let (engine, loads) = counting(
        MemoryLoader::new()
            .with("base", "<{% block b %}{% endblock %}>")
            .with("page", "{% extends \"base\" %}{% block b %}{{ v }}{% endblock %}"),
    );

    let first = engine.get_template("page")?;
    let second = engine.get_template("page")?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    assert_eq!(engine.render("page", &Context::new().with("v", 1))?, "<1>");
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    engine.clear_cache();
    engine.render("page", &Context::new().with("v", 2))?;
    assert_eq!(loads.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn test_shared_engine_across_threads() -> anyhow::Result<()> {
    let (engine, loads) = counting(
        MemoryLoader::new()
            .with("list", "{% for x in xs %}{{ x * k }},{% endfor %}"),
    );
    let engine = Arc::new(engine);

    let handles: Vec<_> = (1..=6)
        .map(|k| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let ctx = Context::new().with("xs", vec![1, 2]).with("k", k);
                engine.render("list", &ctx)
            })
        })
        .collect();

    for (k, handle) in (1..=6).zip(handles) {
        let out = handle.join().expect("render thread panicked")?;
        assert_eq!(out, format!("{},{},", k, 2 * k));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_render_is_deterministic() -> anyhow::Result<()> {
    let engine = Engine::new();
    let ctx = Context::new()
        .with("m", [("z", 1), ("a", 2), ("m", 3)].into_iter().collect::<stencil::Value>());
    let src = "{% for k, v in m %}{{ k }}{{ v }}{% endfor %}|{{ m | keys | join('-') }}";

    let first = engine.render_str(src, &ctx)?;
    for _ in 0..10 {
        assert_eq!(engine.render_str(src, &ctx)?, first);
    }
    assert_eq!(first, "z1a2m3|z-a-m");
    Ok(())
}
