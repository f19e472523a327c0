//! Building the scene arena from fetched documents.

use super::{GeometrySource, NodeId, NodeKind, PartGeometry, Primitive, Scene, SceneNode};
use crate::cache::ResourceCache;
use crate::error::{ReferenceChain, Result, StepperError};
use crate::format::{Directive, Document, Meta, SubFileRef, MAIN_COLOUR};
use crate::library::{resolve, PartReference, ResolveContext};
use crate::scene::ColourSlot;
use crate::types::{is_mirroring, orientation_fix};
use glam::Mat4;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Where a reference points.
pub(crate) enum Target {
    /// A file embedded in an already available document.
    Embedded { document: Arc<Document>, index: usize },
    /// A separate resource.
    External(Url),
}

/// Embedded files of the referencing document win, then those of the root
/// document; anything else is fetched.
pub(crate) fn locate(
    name: &str,
    current: &Arc<Document>,
    root: &Arc<Document>,
    ctx: &ResolveContext,
) -> Target {
    for document in [current, root] {
        if let Some(index) = document.embedded_index(name) {
            return Target::Embedded {
                document: document.clone(),
                index,
            };
        }
    }
    Target::External(resolve(&PartReference::new(name), ctx))
}

pub(crate) struct Builder<'a> {
    scene: &'a mut Scene,
    cache: &'a ResourceCache,
    root: &'a Arc<Document>,
    documents: &'a HashMap<String, Arc<Document>>,
    ctx: &'a ResolveContext,
    max_depth: usize,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(
        scene: &'a mut Scene,
        cache: &'a ResourceCache,
        root: &'a Arc<Document>,
        documents: &'a HashMap<String, Arc<Document>>,
        ctx: &'a ResolveContext,
        max_depth: usize,
    ) -> Self {
        Self {
            scene,
            cache,
            root,
            documents,
            ctx,
            max_depth,
        }
    }

    pub(crate) fn build(mut self) -> Result<()> {
        let root = self.root.clone();
        let name = root.main().name.clone();
        let children = self.build_model(&root, 0, MAIN_COLOUR, &ReferenceChain::new(name.clone()))?;

        let id = self.scene.push_node(SceneNode {
            name,
            kind: NodeKind::Group {
                children: Vec::new(),
            },
            transform: orientation_fix(),
            step_marker: false,
            color_id: MAIN_COLOUR,
            parent: None,
            visible: true,
        });
        self.adopt(id, children);
        self.scene.root = id;
        Ok(())
    }

    /// Build the children of a model file, in source order.
    fn build_model(
        &mut self,
        document: &Arc<Document>,
        index: usize,
        colour: u32,
        chain: &ReferenceChain,
    ) -> Result<Vec<NodeId>> {
        if chain.len() > self.max_depth {
            return Err(StepperError::ReferenceTooDeep {
                chain: chain.clone(),
            });
        }

        let file = &document.files[index];
        let mut children = Vec::new();
        let mut pending_marker = false;
        let mut run: Vec<&Directive> = Vec::new();

        for directive in &file.directives {
            match directive {
                Directive::Meta(Meta::Step | Meta::RotStep) => {
                    if let Some(id) = self.flush_run(&mut run, colour, &file.name) {
                        emit(self.scene, &mut children, &mut pending_marker, id);
                    }
                    // a marker with nothing emitted since the last one is absorbed
                    pending_marker = true;
                }
                Directive::Meta(_) => {}
                Directive::SubFile(reference) => {
                    if let Some(id) = self.flush_run(&mut run, colour, &file.name) {
                        emit(self.scene, &mut children, &mut pending_marker, id);
                    }
                    if let Some(id) = self.build_reference(document, reference, colour, chain)? {
                        emit(self.scene, &mut children, &mut pending_marker, id);
                    }
                }
                drawing => run.push(drawing),
            }
        }
        if let Some(id) = self.flush_run(&mut run, colour, &file.name) {
            emit(self.scene, &mut children, &mut pending_marker, id);
        }

        Ok(children)
    }

    /// One node for a type-1 line, or `None` when it draws nothing.
    fn build_reference(
        &mut self,
        current: &Arc<Document>,
        reference: &SubFileRef,
        parent_colour: u32,
        chain: &ReferenceChain,
    ) -> Result<Option<NodeId>> {
        let colour = if reference.colour == MAIN_COLOUR {
            parent_colour
        } else {
            reference.colour
        };
        let chain = chain.with(reference.name.replace('\\', "/"));
        let (document, index, key) = self.find(current, &reference.name, &chain)?;
        let file = &document.files[index];

        if file.is_part() {
            let cache = self.cache;
            let shared =
                cache.acquire_geometry(&key, || self.flatten_part(&document, index, &chain))?;
            if shared.geometry.is_empty() {
                cache.release_geometry(&shared.key);
                return Ok(None);
            }

            let original_material = self.scene.original_material_for(colour);
            let id = self.scene.push_node(SceneNode {
                name: file.name.clone(),
                kind: NodeKind::Primitive(Primitive {
                    geometry: shared.geometry,
                    handle: shared.handle,
                    source: GeometrySource::Shared { key: shared.key },
                    original_material,
                }),
                transform: reference.transform,
                step_marker: false,
                color_id: colour,
                parent: None,
                visible: true,
            });
            return Ok(Some(id));
        }

        let children = self.build_model(&document, index, colour, &chain)?;
        if children.is_empty() {
            return Ok(None);
        }
        let id = self.scene.push_node(SceneNode {
            name: file.name.clone(),
            kind: NodeKind::Group {
                children: Vec::new(),
            },
            transform: reference.transform,
            step_marker: false,
            color_id: colour,
            parent: None,
            visible: true,
        });
        self.adopt(id, children);
        Ok(Some(id))
    }

    /// Turn a run of inline polygons into one scene-owned primitive.
    fn flush_run(&mut self, run: &mut Vec<&Directive>, parent_colour: u32, file_name: &str) -> Option<NodeId> {
        if run.is_empty() {
            return None;
        }
        let directives = std::mem::take(run);

        // the run takes the colour of its first polygon
        let colour = directives
            .iter()
            .find_map(|d| match d {
                Directive::Triangle { colour, .. } | Directive::Quad { colour, .. } => Some(*colour),
                _ => None,
            })
            .map(|c| if c == MAIN_COLOUR { parent_colour } else { c })?;

        let mut geometry = PartGeometry::new();
        for directive in directives {
            geometry.push(directive, &Mat4::IDENTITY, ColourSlot::Main, false);
        }
        if geometry.is_empty() {
            return None;
        }
        for triangle in &mut geometry.triangles {
            if triangle.colour == ColourSlot::Code(colour) {
                triangle.colour = ColourSlot::Main;
            }
        }

        let handle = self.cache.device().create_geometry(&geometry);
        let original_material = self.scene.original_material_for(colour);
        Some(self.scene.push_node(SceneNode {
            name: format!("{} (inline)", file_name),
            kind: NodeKind::Primitive(Primitive {
                geometry: Arc::new(geometry),
                handle,
                source: GeometrySource::Owned,
                original_material,
            }),
            transform: Mat4::IDENTITY,
            step_marker: false,
            color_id: colour,
            parent: None,
            visible: true,
        }))
    }

    fn flatten_part(
        &self,
        document: &Arc<Document>,
        index: usize,
        chain: &ReferenceChain,
    ) -> Result<PartGeometry> {
        let mut geometry = PartGeometry::new();
        self.flatten_into(document, index, &Mat4::IDENTITY, ColourSlot::Main, false, chain, &mut geometry)?;
        Ok(geometry)
    }

    #[allow(clippy::too_many_arguments)]
    fn flatten_into(
        &self,
        document: &Arc<Document>,
        index: usize,
        matrix: &Mat4,
        inherited: ColourSlot,
        invert: bool,
        chain: &ReferenceChain,
        out: &mut PartGeometry,
    ) -> Result<()> {
        if chain.len() > self.max_depth {
            return Err(StepperError::ReferenceTooDeep {
                chain: chain.clone(),
            });
        }

        let mut invert_next = false;
        for directive in &document.files[index].directives {
            match directive {
                Directive::Meta(Meta::InvertNext) => invert_next = true,
                Directive::SubFile(reference) => {
                    let chain = chain.with(reference.name.replace('\\', "/"));
                    let (child, child_index, _) = self.find(document, &reference.name, &chain)?;
                    let child_invert = invert
                        ^ std::mem::take(&mut invert_next)
                        ^ is_mirroring(&reference.transform);
                    self.flatten_into(
                        &child,
                        child_index,
                        &(*matrix * reference.transform),
                        ColourSlot::from_code(reference.colour, inherited),
                        child_invert,
                        &chain,
                        out,
                    )?;
                }
                drawing => out.push(drawing, matrix, inherited, invert),
            }
        }
        Ok(())
    }

    /// Document, file index and cache key of a reference target.
    fn find(
        &self,
        current: &Arc<Document>,
        name: &str,
        chain: &ReferenceChain,
    ) -> Result<(Arc<Document>, usize, String)> {
        match locate(name, current, self.root, self.ctx) {
            Target::Embedded { document, index } => {
                let key = format!("{}#{}", document.url, crate::format::normalize_name(name));
                Ok((document, index, key))
            }
            Target::External(url) => match self.documents.get(url.as_str()) {
                Some(document) => Ok((document.clone(), 0, url.to_string())),
                None => Err(StepperError::Fetch {
                    chain: chain.clone(),
                    reason: format!("{} was not loaded", url),
                }),
            },
        }
    }

    fn adopt(&mut self, parent: NodeId, children: Vec<NodeId>) {
        for &child in &children {
            self.scene.nodes[child.0].parent = Some(parent);
        }
        if let NodeKind::Group { children: slot } = &mut self.scene.nodes[parent.0].kind {
            *slot = children;
        }
    }
}

/// Append a child, handing it the pending step marker.
fn emit(scene: &mut Scene, children: &mut Vec<NodeId>, pending_marker: &mut bool, id: NodeId) {
    scene.nodes[id.0].step_marker = std::mem::take(pending_marker);
    children.push(id);
}
