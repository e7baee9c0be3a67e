// resource.rs — GPU 资源的唯一所有权与泄漏计数
//
// 几何体与视频纹理都由核心实例独占；每个句柄登记在账本中，
// 释放后再访问属于生命周期错误（debug 构建直接断言）。

use crate::error::ViewerError;
use crate::mesh::SurfaceDescriptor;
use image::RgbaImage;
use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Counts {
    created: Cell<usize>,
    disposed: Cell<usize>,
}

/// Shared counter of created / disposed handles of one resource kind.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    counts: Rc<Counts>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track<T>(&self, label: &'static str, value: T) -> Tracked<T> {
        self.counts.created.set(self.counts.created.get() + 1);
        Tracked {
            value: Some(value),
            label,
            ledger: self.clone(),
            disposed: Rc::new(Cell::new(false)),
        }
    }

    pub fn created(&self) -> usize {
        self.counts.created.get()
    }

    pub fn disposed(&self) -> usize {
        self.counts.disposed.get()
    }

    pub fn live(&self) -> usize {
        self.created() - self.disposed()
    }
}

/// Observer that outlives the handle it watches.
#[derive(Debug, Clone)]
pub struct DisposalProbe(Rc<Cell<bool>>);

impl DisposalProbe {
    pub fn is_disposed(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug)]
pub struct Tracked<T> {
    value: Option<T>,
    label: &'static str,
    ledger: ResourceLedger,
    disposed: Rc<Cell<bool>>,
}

impl<T> Tracked<T> {
    pub fn get(&self) -> Result<&T, ViewerError> {
        match &self.value {
            Some(v) => Ok(v),
            None => {
                debug_assert!(false, "{} used after dispose", self.label);
                Err(ViewerError::DisposedResource(self.label))
            }
        }
    }

    pub fn probe(&self) -> DisposalProbe {
        DisposalProbe(self.disposed.clone())
    }

    /// Take the inner value out for backend-specific release. Idempotent.
    pub fn dispose(&mut self) -> Option<T> {
        let value = self.value.take();
        if value.is_some() {
            self.disposed.set(true);
            let counts = &self.ledger.counts;
            counts.disposed.set(counts.disposed.get() + 1);
        }
        value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The GPU side the core allocates from. The wgpu renderer is the real
/// implementation; tests substitute a counting fake.
pub trait GpuBackend {
    type Mesh;
    type Texture;

    fn create_mesh(&mut self, surface: &SurfaceDescriptor) -> Self::Mesh;
    fn release_mesh(&mut self, mesh: Self::Mesh);
    fn create_texture(&mut self, width: u32, height: u32) -> Self::Texture;
    fn write_texture(&mut self, texture: &Self::Texture, frame: &RgbaImage);
    fn release_texture(&mut self, texture: Self::Texture);
    fn max_texture_dimension(&self) -> u32;
}
