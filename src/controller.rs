//! 运行控制器
//!
//! 按依赖顺序驱动完整运行：规划剧本 → 落地素材 → 合成分镜 → （可选）生成视频。
//! 此外随时提供单个分镜的重绘和生成视频操作，同一分镜的同类操作不会并发执行。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::GenerativeClient;
use crate::catalog::{analyze_asset, AssetCatalog, AssetKind, CustomAsset};
use crate::config::PipelineConfig;
use crate::error::{CineError, Result};
use crate::events::{LogLine, Reporter, RunEvent, RunStage};
use crate::inflight::InFlightSet;
use crate::pipeline::{
    build_references, entities, materialize, plan_script, render_frame, resolve_entity,
    AssetImage, AssetImages, Clip, ConsistencyAnchor, Frame,
};
use crate::script::{SceneDef, Script};
use crate::video::generate_clip;

/// 单分镜操作的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneOp<T> {
    /// 同一分镜的同类操作正在进行，本次调用没有任何效果
    AlreadyRunning,
    Finished(T),
}

impl<T> SceneOp<T> {
    pub fn finished(self) -> Option<T> {
        match self {
            SceneOp::Finished(v) => Some(v),
            SceneOp::AlreadyRunning => None,
        }
    }
}

/// 界面轮询用的状态快照
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub stage: RunStage,
    pub script: Option<Script>,
    pub assets: AssetImages,
    pub frames: BTreeMap<u32, Frame>,
    pub clips: BTreeMap<u32, Clip>,
    pub consistency_anchor: Option<String>,
    pub regenerating: Vec<u32>,
    pub generating_video: Vec<u32>,
    pub log: Vec<LogLine>,
}

/// 一轮完整运行的全部状态
///
/// `generation` 每次完整运行加一。单分镜操作在调用模型前记下它，完成时
/// 若已换了一轮运行，结果直接丢弃。
#[derive(Debug)]
struct Session {
    generation: u64,
    stage: RunStage,
    script: Option<Script>,
    assets: AssetImages,
    frames: BTreeMap<u32, Frame>,
    clips: BTreeMap<u32, Clip>,
    anchor: ConsistencyAnchor,
}

impl Session {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            stage: RunStage::Idle,
            script: None,
            assets: AssetImages::new(),
            frames: BTreeMap::new(),
            clips: BTreeMap::new(),
            anchor: ConsistencyAnchor::new(),
        }
    }
}

pub struct RunController {
    client: Arc<dyn GenerativeClient>,
    config: PipelineConfig,
    catalog: RwLock<AssetCatalog>,
    session: Mutex<Session>,
    reporter: Reporter,
    run_lock: tokio::sync::Mutex<()>,
    regenerating: InFlightSet,
    generating_video: InFlightSet,
}

impl RunController {
    pub fn new(client: Arc<dyn GenerativeClient>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            catalog: RwLock::new(AssetCatalog::new()),
            session: Mutex::new(Session::new(0)),
            reporter: Reporter::new(),
            run_lock: tokio::sync::Mutex::new(()),
            regenerating: InFlightSet::new(),
            generating_video: InFlightSet::new(),
        })
    }

    pub fn with_catalog(self, catalog: AssetCatalog) -> Self {
        *self.catalog_mut() = catalog;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.reporter.subscribe()
    }

    // ---- 素材目录 ----

    pub fn catalog(&self) -> AssetCatalog {
        self.catalog_ref().clone()
    }

    pub fn add_asset(&self, asset: CustomAsset) {
        self.catalog_mut().insert(asset);
    }

    /// 上传素材并识别分类，返回素材 id
    ///
    /// 识别期间素材以 pending 状态留在目录中；识别失败时保持 pending 并返回错误。
    pub async fn upload_asset(&self, name: &str, image_ref: &str) -> Result<String> {
        let pending = CustomAsset::pending(name, image_ref);
        let id = pending.id.clone();
        self.catalog_mut().insert(pending.clone());

        let analyzed = analyze_asset(self.client.as_ref(), &pending).await?;
        self.reporter.info(format!(
            "🖼️ Asset \"{}\" classified as {}",
            analyzed.name, analyzed.kind
        ));
        // 识别期间素材可能已被删除，不再写回
        let mut catalog = self.catalog_mut();
        if catalog.get(&id).is_some() {
            catalog.insert(analyzed);
        }
        Ok(id)
    }

    pub fn reclassify_asset(&self, id: &str, kind: AssetKind) -> Result<()> {
        self.catalog_mut().reclassify(id, kind)
    }

    pub fn remove_asset(&self, id: &str) -> Result<CustomAsset> {
        self.catalog_mut()
            .remove(id)
            .ok_or_else(|| CineError::UnknownAsset(id.to_string()))
    }

    // ---- 完整运行 ----

    /// 执行一次完整运行
    ///
    /// 阶段只向前推进，阶段内的失败由各自的兜底策略吸收，因此总会到达 `Done`。
    /// 已有完整运行在进行时返回 [`CineError::RunInProgress`]。
    pub async fn run(&self, topic: &str) -> Result<RunSnapshot> {
        let _run = self.run_lock.try_lock().map_err(|_| CineError::RunInProgress)?;

        self.reporter.clear();
        let generation = {
            let mut session = self.session();
            let next = session.generation + 1;
            *session = Session::new(next);
            next
        };

        self.set_stage(RunStage::PlanningScript);
        let catalog = self.catalog();
        let script = plan_script(self.client.as_ref(), topic, &catalog, &self.reporter).await;
        self.session().script = Some(script.clone());

        self.set_stage(RunStage::MaterializingAssets);
        materialize(self.client.as_ref(), &script, &catalog, &self.reporter, |image| {
            self.session()
                .assets
                .insert(image.owner_id.clone(), image.clone());
        })
        .await;

        self.set_stage(RunStage::CompositingScenes);
        for scene in &script.scenes {
            self.compose_scene(scene, generation).await;
        }

        if self.config.generate_videos {
            self.set_stage(RunStage::GeneratingVideos);
            for scene in &script.scenes {
                let frame = self.session().frames.get(&scene.id).cloned();
                match frame {
                    Some(frame) => {
                        self.video_for_scene(scene, &frame, generation).await;
                    }
                    None => debug!("Scene {} has no frame, skipping video", scene.id),
                }
            }
        }

        self.set_stage(RunStage::Done);
        self.reporter.info("✅ Run finished");
        Ok(self.snapshot())
    }

    // ---- 单分镜操作 ----

    /// 重绘单个分镜，使用当前的一致性锚点，不回放之前的分镜
    pub async fn regenerate_scene(&self, scene_id: u32) -> Result<SceneOp<Frame>> {
        let (scene, generation) = self.scene_def(scene_id)?;
        let Some(_guard) = self.regenerating.try_acquire(scene_id) else {
            debug!("Scene {} regeneration already in flight", scene_id);
            return Ok(SceneOp::AlreadyRunning);
        };

        self.reporter.info(format!("🔄 Regenerating scene {}", scene_id));
        Ok(SceneOp::Finished(self.compose_scene(&scene, generation).await))
    }

    /// 为单个分镜生成视频；失败时返回 `Finished(None)`
    pub async fn generate_video_for_scene(&self, scene_id: u32) -> Result<SceneOp<Option<Clip>>> {
        let (scene, frame, generation) = {
            let session = self.session();
            let scene = session
                .script
                .as_ref()
                .and_then(|s| s.scene(scene_id))
                .cloned()
                .ok_or(CineError::UnknownScene(scene_id))?;
            let frame = session
                .frames
                .get(&scene_id)
                .cloned()
                .ok_or(CineError::MissingFrame(scene_id))?;
            (scene, frame, session.generation)
        };

        Ok(self.video_for_scene(&scene, &frame, generation).await)
    }

    /// 重新落地某个角色或环境的图片，覆盖当前结果
    pub async fn reresolve_asset(&self, def_id: &str) -> Result<AssetImage> {
        let (script, generation) = {
            let session = self.session();
            let script = session
                .script
                .clone()
                .ok_or_else(|| CineError::UnknownAsset(def_id.to_string()))?;
            (script, session.generation)
        };
        let entity = entities(&script)
            .into_iter()
            .find(|e| e.id == def_id)
            .ok_or_else(|| CineError::UnknownAsset(def_id.to_string()))?;

        let catalog = self.catalog();
        let image = resolve_entity(self.client.as_ref(), entity, &catalog, &self.reporter).await;
        {
            let mut session = self.session();
            if session.generation != generation {
                drop(session);
                self.discard_stale(format!("asset image for {}", def_id));
                return Ok(image);
            }
            session.assets.insert(image.owner_id.clone(), image.clone());
        }
        self.reporter.emit(RunEvent::Asset(image.clone()));
        Ok(image)
    }

    // ---- 状态读取 ----

    pub fn stage(&self) -> RunStage {
        self.session().stage
    }

    pub fn script(&self) -> Option<Script> {
        self.session().script.clone()
    }

    pub fn frame(&self, scene_id: u32) -> Option<Frame> {
        self.session().frames.get(&scene_id).cloned()
    }

    pub fn clip(&self, scene_id: u32) -> Option<Clip> {
        self.session().clips.get(&scene_id).cloned()
    }

    pub fn asset_image(&self, owner_id: &str) -> Option<AssetImage> {
        self.session().assets.get(owner_id).cloned()
    }

    pub fn consistency_anchor(&self) -> Option<String> {
        self.session().anchor.current().map(str::to_string)
    }

    pub fn log(&self) -> Vec<LogLine> {
        self.reporter.lines()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let session = self.session();
        RunSnapshot {
            stage: session.stage,
            script: session.script.clone(),
            assets: session.assets.clone(),
            frames: session.frames.clone(),
            clips: session.clips.clone(),
            consistency_anchor: session.anchor.current().map(str::to_string),
            regenerating: self.regenerating.snapshot(),
            generating_video: self.generating_video.snapshot(),
            log: self.reporter.lines(),
        }
    }

    // ---- 内部 ----

    /// 合成一个分镜并推进锚点；完整运行和重绘共用
    ///
    /// 生成调用期间不持有任何锁，不同分镜可以同时重绘。
    async fn compose_scene(&self, scene: &SceneDef, generation: u64) -> Frame {
        let references = {
            let session = self.session();
            let catalog = self.catalog_ref();
            build_references(
                scene,
                &session.assets,
                &catalog,
                session.anchor.current(),
                self.config.consistency,
            )
        };

        let frame = render_frame(self.client.as_ref(), scene, &references, &self.reporter).await;

        {
            let mut session = self.session();
            if session.generation != generation {
                drop(session);
                self.discard_stale(format!("frame for scene {}", scene.id));
                return frame;
            }
            session.anchor.observe(&frame);
            session.frames.insert(frame.scene_id, frame.clone());
        }
        self.reporter.emit(RunEvent::Frame(frame.clone()));
        frame
    }

    async fn video_for_scene(
        &self,
        scene: &SceneDef,
        frame: &Frame,
        generation: u64,
    ) -> SceneOp<Option<Clip>> {
        let Some(_guard) = self.generating_video.try_acquire(scene.id) else {
            debug!("Scene {} video already in flight", scene.id);
            return SceneOp::AlreadyRunning;
        };

        let clip = generate_clip(
            self.client.as_ref(),
            scene,
            frame,
            &self.config.video,
            &self.reporter,
        )
        .await;

        if let Some(clip) = &clip {
            let current = {
                let mut session = self.session();
                let current = session.generation == generation;
                if current {
                    session.clips.insert(clip.scene_id, clip.clone());
                }
                current
            };
            if current {
                self.reporter.emit(RunEvent::Clip(clip.clone()));
            } else {
                self.discard_stale(format!("clip for scene {}", scene.id));
            }
        }
        SceneOp::Finished(clip)
    }

    /// 查分镜定义，同时返回它所属的运行轮次
    fn scene_def(&self, scene_id: u32) -> Result<(SceneDef, u64)> {
        let session = self.session();
        let scene = session
            .script
            .as_ref()
            .and_then(|s| s.scene(scene_id))
            .cloned()
            .ok_or(CineError::UnknownScene(scene_id))?;
        Ok((scene, session.generation))
    }

    fn discard_stale(&self, what: String) {
        self.reporter.info(format!("🗑️ Discarded {} from a previous run", what));
    }

    fn set_stage(&self, stage: RunStage) {
        self.session().stage = stage;
        self.reporter.emit(RunEvent::Stage(stage));
        debug!("Stage -> {:?}", stage);
    }

    // 锁中毒时状态仍可用，继续使用内部数据
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn catalog_ref(&self) -> std::sync::RwLockReadGuard<'_, AssetCatalog> {
        self.catalog.read().unwrap_or_else(|p| p.into_inner())
    }

    fn catalog_mut(&self) -> std::sync::RwLockWriteGuard<'_, AssetCatalog> {
        self.catalog.write().unwrap_or_else(|p| p.into_inner())
    }
}
