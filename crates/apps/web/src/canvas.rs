//! 2D canvas renderer: district outlines plus one dot per site.

use formats::GeoPoint;
use lifecycle::{Blueprint, GlobalMutation, RenderBackend};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::dom::document;

const MAP_CSS: &str = "\
.map-active { overscroll-behavior: none; }
canvas.map-canvas { display: block; width: 100%; height: 100%; }";

const MARKER_RADIUS: f64 = 6.0;

pub struct CanvasInstance {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CanvasBackend;

fn canvas_id(region: &str) -> String {
    format!("{region}-canvas")
}

fn ctx_set_fill_style(ctx: &CanvasRenderingContext2d, value: &str) {
    let _ = js_sys::Reflect::set(
        ctx.as_ref(),
        &JsValue::from_str("fillStyle"),
        &JsValue::from_str(value),
    );
}

fn ctx_set_stroke_style(ctx: &CanvasRenderingContext2d, value: &str) {
    let _ = js_sys::Reflect::set(
        ctx.as_ref(),
        &JsValue::from_str("strokeStyle"),
        &JsValue::from_str(value),
    );
}

/// Equirectangular projection around `center`; 256 px spans 360 degrees at zoom 0.
struct Projection {
    center: GeoPoint,
    px_per_deg: f64,
    half_w: f64,
    half_h: f64,
}

impl Projection {
    fn project(&self, p: GeoPoint) -> (f64, f64) {
        (
            self.half_w + (p.lon_deg - self.center.lon_deg) * self.px_per_deg,
            self.half_h - (p.lat_deg - self.center.lat_deg) * self.px_per_deg,
        )
    }
}

fn construct_inner(blueprint: &Blueprint<'_>) -> Result<CanvasInstance, JsValue> {
    let document = document()?;
    let region = blueprint.region.as_str();
    let container = document
        .get_element_by_id(region)
        .ok_or_else(|| JsValue::from_str(&format!("missing #{region}")))?;
    let canvas = document
        .get_element_by_id(&canvas_id(region))
        .ok_or_else(|| JsValue::from_str("map canvas was not attached"))?
        .dyn_into::<HtmlCanvasElement>()?;
    canvas.set_class_name("map-canvas");
    canvas.set_width(container.client_width().max(1) as u32);
    canvas.set_height(container.client_height().max(1) as u32);

    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()?;

    let w = canvas.width() as f64;
    let h = canvas.height() as f64;
    let proj = Projection {
        center: blueprint.options.center,
        px_per_deg: 256.0 * f64::powi(2.0, blueprint.options.zoom as i32) / 360.0,
        half_w: w / 2.0,
        half_h: h / 2.0,
    };

    ctx_set_fill_style(&ctx, "#f1f5f9");
    ctx.fill_rect(0.0, 0.0, w, h);

    ctx.set_line_width(2.0);
    ctx_set_stroke_style(&ctx, "#3388ff");
    ctx_set_fill_style(&ctx, "rgba(51,136,255,0.1)");
    for feature in &blueprint.dataset.features.features {
        for path in feature.geometry.paths() {
            let mut points = path.into_iter().map(|p| proj.project(p));
            let Some((x0, y0)) = points.next() else {
                continue;
            };
            ctx.begin_path();
            ctx.move_to(x0, y0);
            for (x, y) in points {
                ctx.line_to(x, y);
            }
            ctx.close_path();
            ctx.fill();
            ctx.stroke();
        }
    }

    ctx.set_line_width(1.5);
    ctx_set_stroke_style(&ctx, "#ffffff");
    for site in &blueprint.dataset.sites {
        let (x, y) = proj.project(GeoPoint::new(site.longitude, site.latitude));
        ctx_set_fill_style(&ctx, site.category().color());
        ctx.begin_path();
        ctx.arc(x, y, MARKER_RADIUS, 0.0, std::f64::consts::TAU)?;
        ctx.fill();
        ctx.stroke();
    }

    Ok(CanvasInstance { canvas, ctx })
}

impl RenderBackend for CanvasBackend {
    type Instance = CanvasInstance;

    fn globals(&self, blueprint: &Blueprint<'_>) -> Vec<GlobalMutation> {
        let region = blueprint.region.as_str();
        vec![
            GlobalMutation::ClaimContainer {
                region: region.to_string(),
            },
            GlobalMutation::AddClass {
                target: "body".to_string(),
                class: "map-active".to_string(),
            },
            GlobalMutation::InjectStyle {
                id: format!("{region}-style"),
                css: MAP_CSS.to_string(),
            },
            GlobalMutation::AppendNode {
                parent: region.to_string(),
                id: canvas_id(region),
                tag: "canvas".to_string(),
            },
        ]
    }

    fn construct(&mut self, blueprint: &Blueprint<'_>) -> Result<Self::Instance, String> {
        construct_inner(blueprint).map_err(|e| format!("{e:?}"))
    }

    fn release(&mut self, instance: Self::Instance) {
        let w = instance.canvas.width() as f64;
        let h = instance.canvas.height() as f64;
        instance.ctx.clear_rect(0.0, 0.0, w, h);
    }
}
