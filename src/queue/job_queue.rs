// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::VecDeque;
use uuid::Uuid;

use crate::domain::models::job::JobPriority;

/// 内存优先级队列
///
/// 高优先级先出队，同一优先级内先进先出。队列只保存任务 id，
/// 任务本体由调度器持有
#[derive(Debug, Default)]
pub struct JobQueue {
    lanes: [VecDeque<Uuid>; 3],
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队到对应优先级队尾
    pub fn push(&mut self, id: Uuid, priority: JobPriority) {
        self.lanes[priority.rank()].push_back(id);
    }

    /// 从队列中移除任务，返回是否存在
    pub fn remove(&mut self, id: Uuid) -> bool {
        for lane in self.lanes.iter_mut() {
            if let Some(pos) = lane.iter().position(|queued| *queued == id) {
                lane.remove(pos);
                return true;
            }
        }
        false
    }

    /// 按出队顺序取出第一个满足条件的任务
    ///
    /// 不满足条件的任务保持原位，不影响其相对顺序
    pub fn take_first<F>(&mut self, mut eligible: F) -> Option<Uuid>
    where
        F: FnMut(&Uuid) -> bool,
    {
        for lane in self.lanes.iter_mut() {
            if let Some(pos) = lane.iter().position(&mut eligible) {
                return lane.remove(pos);
            }
        }
        None
    }

    pub fn pop(&mut self) -> Option<Uuid> {
        self.take_first(|_| true)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lanes.iter().any(|lane| lane.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.iter().all(VecDeque::is_empty)
    }

    /// 各优先级的排队数量（高、普通、低）
    pub fn depth_by_priority(&self) -> [usize; 3] {
        [self.lanes[0].len(), self.lanes[1].len(), self.lanes[2].len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_then_fifo_order() {
        let mut queue = JobQueue::new();
        let low = Uuid::new_v4();
        let normal_a = Uuid::new_v4();
        let high = Uuid::new_v4();
        let normal_b = Uuid::new_v4();

        queue.push(low, JobPriority::Low);
        queue.push(normal_a, JobPriority::Normal);
        queue.push(high, JobPriority::High);
        queue.push(normal_b, JobPriority::Normal);

        assert_eq!(queue.pop(), Some(high));
        assert_eq!(queue.pop(), Some(normal_a));
        assert_eq!(queue.pop(), Some(normal_b));
        assert_eq!(queue.pop(), Some(low));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_take_first_skips_ineligible_without_reordering() {
        let mut queue = JobQueue::new();
        let blocked = Uuid::new_v4();
        let ready = Uuid::new_v4();
        queue.push(blocked, JobPriority::High);
        queue.push(ready, JobPriority::Normal);

        assert_eq!(queue.take_first(|id| *id != blocked), Some(ready));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(blocked));
    }

    #[test]
    fn test_remove() {
        let mut queue = JobQueue::new();
        let id = Uuid::new_v4();
        queue.push(id, JobPriority::Low);
        assert!(queue.contains(id));
        assert!(queue.remove(id));
        assert!(!queue.remove(id));
        assert!(queue.is_empty());
        assert_eq!(queue.depth_by_priority(), [0, 0, 0]);
    }
}
