// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供采集任务的优先级队列与周期性调度
pub mod job_queue;
pub mod scheduler;

pub use job_queue::JobQueue;
pub use scheduler::JobScheduler;
