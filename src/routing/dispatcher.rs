//! 顶层分发器
//!
//! 解析请求、执行动作，并在每次动作返回后检查结果：
//!
//! - `Continue`：分发结束
//! - `Forward`：在同一请求内重新解析新 URL，更新上下文后执行新动作
//! - `Redirect`：写入状态码与 `Location`，分发结束
//!
//! 转发和重定向都会产生 [`InterruptedAction`]，它只出现在分发结果中。

use std::sync::Arc;

use tracing::Instrument;

use super::context::{ActionContext, RequestContext};
use super::enforcer::ActionEnforcer;
use super::http::{HttpRequest, HttpResponse, LOCATION, X_TAO_FORWARD};
use super::outcome::{ActionOutcome, InterruptReason, InterruptedAction};
use super::resolution::Resolution;
use super::resolver::Resolver;
use crate::dispatch_span;
use crate::utils::{CoreError, Result};

/// 分发结果
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// 最终响应
    pub response: HttpResponse,
    /// 最后一次中断信号
    pub interrupted: Option<InterruptedAction>,
    /// 本次分发经历的转发次数
    pub forwards: usize,
    /// 最终执行动作时的上下文
    pub context: RequestContext,
}

impl DispatchOutcome {
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.is_some()
    }

    /// 未执行任何动作的结果
    pub fn rejected(response: HttpResponse) -> Self {
        Self {
            response,
            interrupted: None,
            forwards: 0,
            context: RequestContext::default(),
        }
    }
}

/// 分发器
#[derive(Debug, Clone)]
pub struct Dispatcher {
    resolver: Arc<Resolver>,
    max_forwards: usize,
}

impl Dispatcher {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        let max_forwards = resolver.config().max_forwards;
        Self {
            resolver,
            max_forwards,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// 分发请求，错误转换为错误响应
    pub async fn dispatch(&self, request: HttpRequest) -> DispatchOutcome {
        let span = dispatch_span!(request.request_id, request.url);
        async move {
            match self.try_dispatch(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(error_code = e.error_code(), error = %e, "分发失败");
                    DispatchOutcome::rejected(HttpResponse::from_error(&e))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// 分发请求
    ///
    /// # Errors
    ///
    /// 解析失败、控制器或动作不存在、动作本身失败、转发次数超过上限。
    pub async fn try_dispatch(&self, request: HttpRequest) -> Result<DispatchOutcome> {
        let resolution = self.resolver.resolve(&request)?;
        let mut ctx = ActionContext::new(request);
        ctx.context.update(&resolution);

        let mut outcome = ActionEnforcer::enforce_resolution(&resolution, &mut ctx).await?;
        let mut interrupted = None;
        let mut forwards = 0;

        loop {
            match outcome {
                ActionOutcome::Continue => break,
                ActionOutcome::Redirect { url, status } => {
                    tracing::debug!(url = %url, status, "重定向");
                    ctx.response.set_status(status);
                    ctx.response.set_header(LOCATION, url);
                    interrupted = Some(self.interrupt(&ctx, InterruptReason::Redirect));
                    break;
                }
                ActionOutcome::Forward { url } => {
                    forwards += 1;
                    if forwards > self.max_forwards {
                        return Err(CoreError::ForwardLoop {
                            max: self.max_forwards,
                            url,
                        });
                    }

                    let resolution = self.forward(&mut ctx, &url)?;
                    interrupted = Some(self.interrupt(&ctx, InterruptReason::Forward));
                    outcome = ActionEnforcer::enforce_resolution(&resolution, &mut ctx).await?;
                }
            }
        }

        Ok(DispatchOutcome {
            response: ctx.response,
            interrupted,
            forwards,
            context: ctx.context,
        })
    }

    /// 准备转发：派生请求、重新解析、更新上下文并写入转发头
    fn forward(&self, ctx: &mut ActionContext, url: &str) -> Result<Resolution> {
        let params = ctx.request.forwarded_params();
        let request = ctx.request.forward_to(url);
        let resolution = self.resolver.resolve(&request)?;

        ctx.context.update(&resolution);
        ctx.response.set_header(
            X_TAO_FORWARD,
            format!(
                "{}/{}/{}",
                resolution.extension_id(),
                resolution.module_name(),
                resolution.action_name()
            ),
        );
        ctx.request = request;
        ctx.params = params;

        tracing::debug!(
            url = %url,
            extension = %ctx.context.extension,
            module = %ctx.context.module,
            action = %ctx.context.action,
            "转发"
        );
        Ok(resolution)
    }

    fn interrupt(&self, ctx: &ActionContext, reason: InterruptReason) -> InterruptedAction {
        InterruptedAction {
            module: ctx.context.module.clone(),
            action: ctx.context.action.clone(),
            reason,
        }
    }
}
