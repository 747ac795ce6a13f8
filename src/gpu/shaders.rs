//! WGSL compute shaders for the layout kernels
//!
//! Every module is the shared [`TYPES`] prelude followed by one kernel. All
//! kernels use the same bind group: two particle buffers, the links, the
//! link index, the parameters and the per-workgroup partial sums.

/// Common type definitions and bindings shared by all shaders
pub const TYPES: &str = r#"
struct Particle {
    position: vec3<f32>,
    energy: f32,
    force: vec3<f32>,
    mass: f32,
    velocity: vec3<f32>,
    charge: f32,
    color: vec4<f32>,
    size: f32,
    link_offset: u32,
    link_count: u32,
    _padding: u32,
}

struct Link {
    end_a: u32,
    end_b: u32,
    rest_length: f32,
    _padding: f32,
}

struct Params {
    particle_count: u32,
    step_length: f32,
    spring_tension: f32,
    link_rest_length_scale: f32,
}

struct Partial {
    energy: f32,
    dot: f32,
    checksum: f32,
    _padding: f32,
}

const SOFTENING: f32 = 0.001;

@group(0) @binding(0) var<storage, read_write> state_a: array<Particle>;
@group(0) @binding(1) var<storage, read_write> state_b: array<Particle>;
@group(0) @binding(2) var<storage, read> links: array<Link>;
@group(0) @binding(3) var<storage, read> link_index: array<u32>;
@group(0) @binding(4) var<uniform> params: Params;
@group(0) @binding(5) var<storage, read_write> partials: array<Partial>;
"#;

/// Force and energy of every particle of `state_a`, written to `state_b`
pub const EVALUATE: &str = r#"
@compute @workgroup_size(256)
fn evaluate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.particle_count) {
        return;
    }

    var p = state_a[i];
    var force = vec3<f32>(0.0, 0.0, 0.0);
    var energy: f32 = 0.0;

    // Pairwise repulsion
    for (var j = 0u; j < params.particle_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let other = state_a[j];
        let d = p.position - other.position;
        let r2 = dot(d, d) + SOFTENING * SOFTENING;
        let r = sqrt(r2);
        let qq = p.charge * other.charge;
        energy += qq / r;
        force += d * (qq / (r2 * r));
    }

    // Springs
    for (var k = 0u; k < p.link_count; k = k + 1u) {
        let link = links[link_index[p.link_offset + k]];
        var j = link.end_a;
        if (j == i) {
            j = link.end_b;
        }
        let d = p.position - state_a[j].position;
        let r = length(d);
        let stretch = r - link.rest_length * params.link_rest_length_scale;
        energy += 0.5 * params.spring_tension * stretch * stretch;
        if (r > 0.0) {
            force += d * (-params.spring_tension * stretch / r);
        }
    }

    p.force = force;
    p.energy = energy;
    state_b[i] = p;
}
"#;

/// `state_b = state_a` moved by `step_length` along the force
pub const INTEGRATE: &str = r#"
@compute @workgroup_size(256)
fn integrate(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.particle_count) {
        return;
    }

    var p = state_a[i];
    let displacement = p.force * params.step_length;
    p.position += displacement;
    p.velocity = displacement;
    state_b[i] = p;
}
"#;

/// Per-workgroup tree reduction of energy, force dot product and mass
pub const REDUCE: &str = r#"
var<workgroup> scratch: array<vec3<f32>, 256>;

@compute @workgroup_size(256)
fn reduce(
    @builtin(global_invocation_id) global_id: vec3<u32>,
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>,
) {
    let i = global_id.x;
    let lid = local_id.x;

    var value = vec3<f32>(0.0, 0.0, 0.0);
    if (i < params.particle_count) {
        let a = state_a[i];
        let b = state_b[i];
        value = vec3<f32>(b.energy, -dot(a.force, b.force), b.mass);
    }
    scratch[lid] = value;
    workgroupBarrier();

    for (var stride = 128u; stride > 0u; stride = stride / 2u) {
        if (lid < stride) {
            scratch[lid] += scratch[lid + stride];
        }
        workgroupBarrier();
    }

    if (lid == 0u) {
        let total = scratch[0];
        partials[group_id.x] = Partial(total.x * 0.5, total.y, total.z, 0.0);
    }
}
"#;

/// Complete shader sources, one per kernel
pub struct LayoutShaders {
    pub evaluate: String,
    pub integrate: String,
    pub reduce: String,
}

impl LayoutShaders {
    pub fn new() -> Self {
        Self {
            evaluate: format!("{}\n{}", TYPES, EVALUATE),
            integrate: format!("{}\n{}", TYPES, INTEGRATE),
            reduce: format!("{}\n{}", TYPES, REDUCE),
        }
    }
}

impl Default for LayoutShaders {
    fn default() -> Self {
        Self::new()
    }
}
