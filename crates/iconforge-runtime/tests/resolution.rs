//! Runtime resolution against a scripted asset source

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use iconforge_core::{Bundle, CdnConfig, Manifest, ManifestEntry, ManifestVersion, TagManifest};
use iconforge_runtime::{
    AssetResolution, DispatchError, DynamicTagResolver, IconDispatcher, IconUse, LoadedSections,
    Resolution, ResolveError, RuntimeIconResolver,
};
use iconforge_test_utils::{instant, StaticAssetSource};
use pretty_assertions::assert_eq;

const LOGO_MARKUP: &str = r#"<svg viewBox="0 0 24 24"><path d="M0 0h24"/></svg>"#;

fn published() -> Manifest {
    let at = instant(0);
    let mut manifest = Manifest::new(ManifestVersion::at(at), at);
    for (section, icons) in [("core", vec!["cart", "user"]), ("social", vec!["share"])] {
        let bundle = Bundle::new(
            section,
            icons.into_iter().map(String::from).collect(),
            format!("<svg>{section}</svg>"),
        );
        manifest.sections.insert(
            section.to_string(),
            ManifestEntry::for_bundle(&bundle, at, "production"),
        );
    }
    manifest
}

fn tags() -> TagManifest {
    let hero: BTreeMap<String, String> = [
        ("spring-sale", "https://cms.example.com/hero/spring.webp"),
        ("default", "https://cms.example.com/hero/default.webp"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    TagManifest {
        version: "7".into(),
        last_update: Some(instant(0)),
        categories: [("hero".to_string(), hero)].into_iter().collect(),
    }
}

fn resolver(source: Arc<StaticAssetSource>, loaded: Arc<LoadedSections>) -> RuntimeIconResolver {
    RuntimeIconResolver::new(
        source,
        ["logo"].into_iter().collect(),
        CdnConfig::default(),
        loaded,
    )
}

#[tokio::test]
async fn concurrent_callers_share_one_manifest_fetch() {
    let source = Arc::new(
        StaticAssetSource::default()
            .with_manifest(published())
            .with_delay(Duration::from_millis(20)),
    );
    let resolver = Arc::new(resolver(source.clone(), Arc::new(LoadedSections::new())));

    let lookups = (0..16).map(|i| {
        let resolver = resolver.clone();
        async move {
            let name = if i % 2 == 0 { "cart" } else { "user" };
            resolver.resolve("core", name).await.unwrap()
        }
    });
    let results = join_all(lookups).await;

    assert!(results
        .iter()
        .all(|r| matches!(r, Resolution::Sprite(_))));
    assert_eq!(source.manifest_fetches(), 1);
    assert_eq!(source.bundle_fetches(), 1);
}

#[tokio::test]
async fn unknown_pairs_cost_no_extra_requests() {
    let source = Arc::new(StaticAssetSource::default().with_manifest(published()));
    let resolver = resolver(source.clone(), Arc::new(LoadedSections::new()));

    assert_eq!(resolver.resolve("core", "rocket").await.unwrap(), Resolution::NotFound);
    assert_eq!(resolver.resolve("missing", "cart").await.unwrap(), Resolution::NotFound);
    assert_eq!(resolver.resolve("social", "cart").await.unwrap(), Resolution::NotFound);

    assert_eq!(source.manifest_fetches(), 1);
    assert_eq!(source.bundle_fetches(), 0);
}

#[tokio::test]
async fn offline_source_yields_not_found_everywhere() {
    let source = Arc::new(StaticAssetSource::offline());
    let resolver = resolver(source.clone(), Arc::new(LoadedSections::new()));

    for (section, name) in [("core", "cart"), ("social", "share")] {
        assert_eq!(resolver.resolve(section, name).await.unwrap(), Resolution::NotFound);
    }
    assert_eq!(source.manifest_fetches(), 1);
}

#[tokio::test]
async fn critical_icon_is_refused_in_any_section() {
    let source = Arc::new(StaticAssetSource::default().with_manifest(published()));
    let resolver = resolver(source, Arc::new(LoadedSections::new()));
    for section in ["core", "social", "anything"] {
        assert_eq!(
            resolver.resolve(section, "logo").await,
            Err(ResolveError::CriticalIcon {
                name: "logo".into()
            })
        );
    }
}

#[tokio::test]
async fn loaded_sections_are_shared_and_clearable() {
    let source = Arc::new(StaticAssetSource::default().with_manifest(published()));
    let loaded = Arc::new(LoadedSections::new());
    let first = resolver(source.clone(), loaded.clone());
    let second = resolver(source.clone(), loaded.clone());

    first.resolve("core", "cart").await.unwrap();
    second.resolve("core", "user").await.unwrap();
    assert_eq!(source.bundle_fetches(), 1);
    assert!(loaded.is_loaded("core"));

    loaded.clear();
    assert!(second.prefetch_section("core").await);
    assert_eq!(source.bundle_fetches(), 2);
}

#[tokio::test]
async fn dispatcher_routes_each_declared_variant() {
    let source = Arc::new(
        StaticAssetSource::default()
            .with_manifest(published())
            .with_tags(tags()),
    );
    let icons = Arc::new(resolver(source.clone(), Arc::new(LoadedSections::new())));
    let tags = Arc::new(DynamicTagResolver::new(source.clone(), Duration::from_secs(300)));
    let dispatcher = IconDispatcher::new(icons, tags).with_inline("logo", LOGO_MARKUP);

    assert_eq!(
        dispatcher.resolve(&IconUse::inline("logo")).await.unwrap(),
        AssetResolution::Inline(LOGO_MARKUP.to_string())
    );

    let sprite = dispatcher
        .resolve(&IconUse::sprite("social", "share"))
        .await
        .unwrap();
    let AssetResolution::Url(url) = sprite else {
        panic!("sprite use must resolve to a URL");
    };
    assert!(url.starts_with("https://cdn.example.com/icons/sprite-social-"));
    assert!(url.ends_with("#icon-share"));

    assert_eq!(
        dispatcher
            .resolve(&IconUse::sprite("core", "rocket"))
            .await
            .unwrap(),
        AssetResolution::Placeholder
    );
    assert_eq!(
        dispatcher
            .resolve(&IconUse::dynamic_tag("hero", ["black-friday", "spring-sale", "default"]))
            .await
            .unwrap(),
        AssetResolution::Url("https://cms.example.com/hero/spring.webp".to_string())
    );
    assert_eq!(
        dispatcher
            .resolve(&IconUse::dynamic_tag("banner", ["default"]))
            .await
            .unwrap(),
        AssetResolution::Placeholder
    );
    assert_eq!(source.tag_fetches(), 1);
}

#[tokio::test]
async fn dispatcher_reports_authoring_mistakes() {
    let source = Arc::new(StaticAssetSource::default().with_manifest(published()));
    let icons = Arc::new(resolver(source.clone(), Arc::new(LoadedSections::new())));
    let tags = Arc::new(DynamicTagResolver::new(source, Duration::from_secs(300)));
    let dispatcher = IconDispatcher::new(icons, tags);

    assert_eq!(
        dispatcher.resolve(&IconUse::inline("logo")).await,
        Err(DispatchError::MissingInline("logo".into()))
    );
    assert!(matches!(
        dispatcher.resolve(&IconUse::sprite("core", "logo")).await,
        Err(DispatchError::Resolve(ResolveError::CriticalIcon { .. }))
    ));
}

#[tokio::test]
async fn tag_outage_degrades_to_placeholders() {
    let source = Arc::new(StaticAssetSource::offline());
    let tags = DynamicTagResolver::new(source.clone(), Duration::from_secs(300));

    assert_eq!(tags.resolve("hero", &["default"]).await, None);
    assert_eq!(tags.resolve("hero", &["default"]).await, None);
    assert_eq!(source.tag_fetches(), 1);
}
