//! 会话监管：取消与关闭
//!
//! 每次运行从根 token 派生子 token；cancel() 只取消当前运行，shutdown() 取消根 token（所有运行）。
//! 取消在下一个步骤边界生效，进行中的工具调用不会被强行中断。
//!
//! 空闲时预先备好下一次运行的 token：请求已提交但还没开始（在等会话锁或还没被调度）时收到的 cancel
//! 落在这个 token 上，begin_run 领取它后该运行在第一个步骤边界即中止。

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct RunSlot {
    token: CancellationToken,
    /// token 已被某次运行领取
    active: bool,
}

#[derive(Debug)]
pub struct SessionSupervisor {
    root: CancellationToken,
    slot: Mutex<RunSlot>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        let root = CancellationToken::new();
        let slot = Mutex::new(RunSlot {
            token: root.child_token(),
            active: false,
        });
        Self { root, slot }
    }

    /// 开始一次新运行，返回它的取消令牌；运行开始前收到的 cancel 已体现在令牌上
    pub async fn begin_run(&self) -> CancellationToken {
        let mut slot = self.slot.lock().await;
        if slot.active {
            // 上一次运行没有走到 end_run（future 被丢弃）
            slot.token = self.root.child_token();
        }
        slot.active = true;
        slot.token.clone()
    }

    /// 运行结束，为下一次运行备好新的令牌
    pub async fn end_run(&self) {
        let mut slot = self.slot.lock().await;
        slot.token = self.root.child_token();
        slot.active = false;
    }

    /// 取消当前运行；空闲时作用于下一次运行
    pub async fn cancel(&self) {
        self.slot.lock().await.token.cancel();
    }

    /// 取消所有运行（会话结束）
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
