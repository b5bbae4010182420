use std::collections::BTreeMap;
use std::time::Duration;

/// 计时器句柄，由 `TimerArena` 分配，不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// 记录器拥有的计时器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// 360 秒硬上限（一次性）
    Cap,
    /// 30 秒提示音（重复）
    Cue,
    /// 界面刷新，发布快照（重复）
    UiRefresh,
    /// 开始前倒计时（每秒）
    Countdown,
}

#[derive(Debug, Clone)]
struct ArmedTimer {
    kind: TimerKind,
    deadline: Duration,
    period: Option<Duration>,
    last_deadline: Option<Duration>,
}

/// 显式持有的计时器集合
///
/// 到期计时器按 (截止时间, 句柄) 顺序触发，同一时刻先布置的先触发。
/// 取消后的句柄不会再被 `pop_due` 返回。
#[derive(Debug, Default)]
pub struct TimerArena {
    next_id: u64,
    timers: BTreeMap<TimerId, ArmedTimer>,
}

impl TimerArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }

    pub fn arm_once(&mut self, kind: TimerKind, deadline: Duration) -> TimerId {
        let id = self.allocate();
        self.timers.insert(
            id,
            ArmedTimer {
                kind,
                deadline,
                period: None,
                last_deadline: None,
            },
        );
        id
    }

    /// 重复计时器；`last_deadline` 之后不再触发
    pub fn arm_repeating(
        &mut self,
        kind: TimerKind,
        first_deadline: Duration,
        period: Duration,
        last_deadline: Option<Duration>,
    ) -> TimerId {
        let id = self.allocate();
        self.timers.insert(
            id,
            ArmedTimer {
                kind,
                deadline: first_deadline,
                period: Some(period.max(Duration::from_millis(1))),
                last_deadline,
            },
        );
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// 取出最早到期的计时器；重复计时器重新排期，一次性计时器移除
    pub fn pop_due(&mut self, now: Duration) -> Option<(TimerId, TimerKind)> {
        let (id, kind) = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(id, t)| (t.deadline, **id))
            .map(|(id, t)| (*id, t.kind))?;

        let keep = match self.timers.get_mut(&id) {
            Some(timer) => match timer.period {
                Some(period) => {
                    let next = timer.deadline + period;
                    timer.deadline = next;
                    timer.last_deadline.map_or(true, |last| next <= last)
                }
                None => false,
            },
            None => false,
        };
        if !keep {
            self.timers.remove(&id);
        }

        Some((id, kind))
    }
}
