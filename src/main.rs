// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use sportintel::application::pipeline::IntelligencePipeline;
use sportintel::config::settings::Settings;
use sportintel::infrastructure::metrics;
use sportintel::utils::telemetry;
use sportintel::workers::manager::WorkerManager;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，负责加载配置、装配管线并运行后台定时器，直到收到 Ctrl-C
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging
    telemetry::init_telemetry(&settings.telemetry)?;
    info!("Starting sportintel...");
    info!("Configuration loaded");

    // 3. Initialize Prometheus Metrics
    metrics::init_metrics(&settings.metrics)?;

    // 4. Assemble the pipeline
    let pipeline = IntelligencePipeline::from_settings(settings)?;
    info!(
        sources = pipeline.health().sources().len(),
        endpoints = pipeline.transport().stats().total_endpoints,
        "Pipeline ready"
    );

    // 5. Start background timers and workers
    let mut manager = WorkerManager::new();
    pipeline.start_background(&mut manager)?;

    // 6. Run until shutdown
    manager.wait_for_shutdown().await;
    pipeline.shutdown();

    Ok(())
}
