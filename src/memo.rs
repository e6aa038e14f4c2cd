use std::rc::Rc;

use crate::config::EngineConfig;
use crate::correlate::attach_annotations_to_traces_with_config;
use crate::types::{AnnotatedTreeNode, Annotation, TreeNode};

struct CachedForest {
    traces: Rc<[TreeNode]>,
    annotations: Rc<[Annotation]>,
    annotated: Rc<[AnnotatedTreeNode]>,
}

/// Remembers the last annotated forest and hands it out again while the caller keeps passing the
/// same two inputs. Inputs are compared by `Rc` identity, not by value: a new fetch produces new
/// `Rc`s and invalidates the memo.
pub struct AnnotatedForestMemo {
    config: EngineConfig,
    cached: Option<CachedForest>,
}

impl Default for AnnotatedForestMemo {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl AnnotatedForestMemo {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cached: None,
        }
    }

    pub fn get(
        &mut self,
        traces: &Rc<[TreeNode]>,
        annotations: &Rc<[Annotation]>,
    ) -> Rc<[AnnotatedTreeNode]> {
        if let Some(cached) = &self.cached {
            if Rc::ptr_eq(&cached.traces, traces) && Rc::ptr_eq(&cached.annotations, annotations) {
                return cached.annotated.clone();
            }
        }

        let annotated: Rc<[AnnotatedTreeNode]> =
            attach_annotations_to_traces_with_config(traces, annotations, &self.config).into();
        self.cached = Some(CachedForest {
            traces: traces.clone(),
            annotations: annotations.clone(),
            annotated: annotated.clone(),
        });
        annotated
    }

    pub fn is_cached(&self, traces: &Rc<[TreeNode]>, annotations: &Rc<[Annotation]>) -> bool {
        self.cached.as_ref().is_some_and(|cached| {
            Rc::ptr_eq(&cached.traces, traces) && Rc::ptr_eq(&cached.annotations, annotations)
        })
    }

    pub fn clear(&mut self) {
        self.cached = None;
    }
}
