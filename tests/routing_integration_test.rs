//! 路由解析与分发集成测试
//!
//! 从配置文件和扩展目录组装实例，验证解析顺序、转发和重定向的完整流程。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tao_core::routing::{InterruptReason, LOCATION, X_TAO_FORWARD};
use tao_core::{
    ActionContext, ActionOutcome, Controller, ControllerRegistry, CoreConfig, CoreError,
    HttpRequest, Result, TaoCore,
};
use tempfile::TempDir;

// ============================================================================
// 测试控制器
// ============================================================================

/// `Items` 控制器：edit 转发到投递扩展，preview 重定向
struct Items;

#[async_trait]
impl Controller for Items {
    fn has_action(&self, action: &str) -> bool {
        matches!(action, "edit" | "preview")
    }

    async fn call(&self, action: &str, ctx: &mut ActionContext) -> Result<ActionOutcome> {
        match action {
            "edit" => {
                let uri = ctx.param_str("uri").unwrap_or("none").to_string();
                Ok(ctx.forward("run", Some("Runner"), Some("taoDelivery"), &[("id", uri.as_str())]))
            }
            _ => Ok(ctx.redirect_with_status("/tao/Main/login", 303)),
        }
    }
}

struct Runner;

#[async_trait]
impl Controller for Runner {
    fn has_action(&self, action: &str) -> bool {
        action == "run"
    }

    async fn call(&self, _action: &str, ctx: &mut ActionContext) -> Result<ActionOutcome> {
        let body = json!({
            "success": true,
            "id": ctx.param_str("id"),
            "extension": ctx.context.extension,
        });
        ctx.response.set_json(body);
        Ok(ActionOutcome::Continue)
    }
}

struct Main;

#[async_trait]
impl Controller for Main {
    fn has_action(&self, action: &str) -> bool {
        action == "index"
    }

    async fn call(&self, _action: &str, ctx: &mut ActionContext) -> Result<ActionOutcome> {
        ctx.response.set_json(json!({"success": true, "page": "main"}));
        Ok(ActionOutcome::Continue)
    }
}

fn controllers() -> Arc<ControllerRegistry> {
    let registry = Arc::new(ControllerRegistry::new());
    registry.register("oat\\taoQti\\controller::Items", || Arc::new(Items) as Arc<dyn Controller>);
    registry.register("taoDelivery_actions_Runner", || Arc::new(Runner) as Arc<dyn Controller>);
    registry.register("oat::tao::controller::Main", || Arc::new(Main) as Arc<dyn Controller>);
    registry
}

/// 写入配置文件和两个扩展目录，返回配置文件路径所在的临时目录
async fn setup() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let ext_dir = temp_dir.path().join("extensions");

    tokio::fs::create_dir_all(ext_dir.join("taoQti")).await.unwrap();
    tokio::fs::write(
        ext_dir.join("taoQti").join("manifest.yaml"),
        r#"
id: taoQti
name: QTI
version: 2.1.0
routes:
  /taoQti:
    class: oat\tao\model\routing\NamespaceRoute
    namespace: oat\taoQti\controller
"#,
    )
    .await
    .unwrap();

    tokio::fs::create_dir_all(ext_dir.join("taoDelivery")).await.unwrap();
    tokio::fs::write(
        ext_dir.join("taoDelivery").join("manifest.json"),
        r#"{
  "id": "taoDelivery",
  "routes": {
    "runner": {
      "class": "RegexRoute",
      "pattern": "^taoDelivery/(?P<ctl>Runner)/(?P<act>\\w+)$",
      "target": "taoDelivery_actions_${ctl}@${act}"
    }
  }
}"#,
    )
    .await
    .unwrap();

    let config = format!(
        r#"
routing:
  base_path: /platform
  max_forwards: 4
extensions:
  - id: tao
    routes:
      /tao: "oat::tao::controller"
extension_dirs:
  - {}
"#,
        ext_dir.display()
    );
    tokio::fs::write(temp_dir.path().join("config.yaml"), config)
        .await
        .unwrap();

    temp_dir
}

async fn core(temp_dir: &TempDir) -> TaoCore {
    let config = CoreConfig::from_file(temp_dir.path().join("config.yaml"))
        .await
        .unwrap();
    let mut core = TaoCore::with_controllers(config, controllers()).await.unwrap();
    core.start().unwrap();
    core
}

// ============================================================================
// 解析
// ============================================================================

#[tokio::test]
async fn test_extensions_registered_in_config_then_scan_order() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    assert_eq!(
        core.extensions().installed_ids(),
        vec!["tao", "taoDelivery", "taoQti"]
    );
    assert_eq!(core.cache_stats().size, 3);
}

#[tokio::test]
async fn test_resolve_full_url_with_base_path() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    let resolution = core
        .resolve("https://tao.example/platform/taoQti/Items/edit?uri=item_1")
        .unwrap();

    assert_eq!(resolution.extension_id(), "taoQti");
    assert_eq!(resolution.controller_name(), "oat\\taoQti\\controller::Items");
    assert_eq!(resolution.action_name(), "edit");
    assert_eq!(resolution.module_name(), "Items");
    assert_eq!(resolution.relative_url(), "taoQti/Items/edit");
}

#[tokio::test]
async fn test_unresolved_route() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    let err = core.resolve("/platform/unknownExt/Foo/bar").unwrap_err();
    assert!(matches!(err, CoreError::UnresolvedRoute(_)));

    let outcome = core.dispatch(HttpRequest::get("/platform/unknownExt/Foo/bar")).await;
    assert_eq!(outcome.response.status, 404);
}

// ============================================================================
// 分发
// ============================================================================

#[tokio::test]
async fn test_forward_across_extensions() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    let outcome = core
        .dispatch(HttpRequest::get("/platform/taoQti/Items/edit?uri=item_1"))
        .await;

    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.forwards, 1);
    assert_eq!(
        outcome.response.header(X_TAO_FORWARD),
        Some("taoDelivery/Runner/run")
    );
    assert_eq!(outcome.interrupted.as_ref().map(|i| i.reason), Some(InterruptReason::Forward));

    let body = outcome.response.body.unwrap();
    assert_eq!(body["id"], "item_1");
    assert_eq!(body["extension"], "taoDelivery");

    assert_eq!(outcome.context.extension, "taoDelivery");
    assert_eq!(outcome.context.module, "Runner");
    assert_eq!(outcome.context.action, "run");
}

#[tokio::test]
async fn test_redirect_sets_location() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    let outcome = core
        .dispatch(HttpRequest::get("/platform/taoQti/Items/preview"))
        .await;

    assert_eq!(outcome.response.status, 303);
    assert_eq!(outcome.response.header(LOCATION), Some("/tao/Main/login"));
    assert!(outcome.response.is_redirect());
    assert_eq!(outcome.forwards, 0);
}

#[tokio::test]
async fn test_namespace_shorthand_defaults() {
    let temp_dir = setup().await;
    let core = core(&temp_dir).await;

    let outcome = core.dispatch(HttpRequest::get("/platform/tao")).await;
    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.body.unwrap()["page"], "main");
    assert_eq!(outcome.context.module, "Main");
    assert_eq!(outcome.context.action, "index");
}

#[tokio::test]
async fn test_invalid_manifest_aborts_start() {
    let config = CoreConfig::builder()
        .extension(tao_core::Extension::new("broken").with_route(
            "/broken",
            json!({"class": "UnknownRoute"}),
        ))
        .build();
    let mut core = TaoCore::new(config).await.unwrap();

    let err = core.start().unwrap_err();
    assert!(matches!(err, CoreError::InvalidRouteConfig { .. }));
}
