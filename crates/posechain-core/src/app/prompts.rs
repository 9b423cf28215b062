//! Prompt templates.
//!
//! Every prompt pins the same style, background, camera and lighting so that
//! clips generated independently still cut together.

use crate::domain::{PetProfile, Pose, Transition};

const STYLE: &str = "Pixar-style 3D cartoon, cute rounded shapes, big eyes";
const BACKGROUND: &str = "pure white background (#FFFFFF) for the whole clip, \
     no other elements, no shadows, no floor, the background never changes";
const CAMERA: &str = "camera faces the {species} head-on at eye level, \
     {species} centred and fully in frame";
const LIGHTING: &str = "soft even studio lighting, no harsh shadows, lighting stays constant";
const STATIC_CAMERA: &str = "the camera does not move";

pub const NEGATIVE_PROMPT: &str = "background change, scene change, grass, floor, indoor, \
     outdoor, shadow change, lighting change, colour change, blur, low quality";

fn pose_description(pose: Pose) -> &'static str {
    match pose {
        Pose::Sit => {
            "standard sitting pose, front legs straight, hind legs tucked under, \
             head slightly raised, looking at the camera, relaxed expression"
        }
        Pose::Walk => {
            "walking pose, all four paws on the ground, diagonal legs stepping forward, \
             body leaning slightly forward, tail swaying naturally"
        }
        Pose::Rest => {
            "lying down, legs tucked under, front paws stretched forward, \
             chin slightly raised, eyes open and alert"
        }
        Pose::Sleep => {
            "sleeping, curled up on its side, eyes fully closed, peaceful expression, \
             tail wrapped around the body, gentle breathing visible"
        }
    }
}

fn motion_description(transition: Transition) -> String {
    use Pose::*;
    let text = match (transition.start(), transition.end()) {
        (Sit, Walk) => "slowly stands up from sitting and starts walking with a natural gait",
        (Sit, Rest) => "slowly lies down from sitting, front legs sliding forward",
        (Sit, Sleep) => {
            "drops straight from sitting into sleep, leaning forward to lie down, eyes slowly closing"
        }
        (Rest, Sleep) => "lowers its head from lying down, closes its eyes and falls asleep",
        (Walk, Sit) => "stops walking and sits down calmly",
        (Walk, Rest) => "stops walking and lies down slowly",
        (Walk, Sleep) => "stops walking, lies down and drifts off to sleep",
        (Rest, Sit) => "pushes up from lying down into a sitting pose",
        (Rest, Walk) => "gets up from lying down and starts walking",
        (Sleep, Sit) => "wakes up, stretches and sits up",
        (Sleep, Walk) => "wakes up, stands and starts walking",
        (Sleep, Rest) => "wakes up and lifts its head, staying lying down",
        (Sit, Sit) | (Walk, Walk) | (Rest, Rest) | (Sleep, Sleep) => "holds still",
    };
    format!("motion: {text}, smooth and unhurried")
}

fn loop_description(pose: Pose) -> &'static str {
    match pose {
        Pose::Sit => {
            "sits and looks around gently, small head movements, then returns to the start"
        }
        Pose::Walk => "walks in place with a steady rhythmic gait, a seamless loop",
        Pose::Rest => "lies still, breathing calmly, ears twitching occasionally",
        Pose::Sleep => "sleeps peacefully, chest rising and falling slowly",
    }
}

fn subject(profile: &PetProfile) -> String {
    let parts: Vec<&str> = [
        profile.color.as_str(),
        profile.breed.as_str(),
        profile.species.as_str(),
    ]
    .into_iter()
    .filter(|s| !s.trim().is_empty())
    .collect();
    if parts.is_empty() {
        "pet".to_string()
    } else {
        parts.join(" ")
    }
}

fn assemble(profile: &PetProfile, action: &str, static_camera: bool) -> String {
    let species = if profile.species.trim().is_empty() {
        "pet"
    } else {
        profile.species.trim()
    };
    let camera = CAMERA.replace("{species}", species);
    let mut parts = vec![STYLE.to_string(), subject(profile), BACKGROUND.to_string()];
    parts.push(action.to_string());
    parts.push(camera);
    if static_camera {
        parts.push(STATIC_CAMERA.to_string());
    }
    parts.push(LIGHTING.to_string());
    parts.join(", ")
}

/// Image prompt for a still pose.
pub fn base_pose(pose: Pose, profile: &PetProfile) -> String {
    assemble(profile, pose_description(pose), false)
}

/// Video prompt for a transition clip.
pub fn transition(transition: Transition, profile: &PetProfile) -> String {
    assemble(profile, &motion_description(transition), true)
}

/// Video prompt for a loop clip that starts and ends on `pose`.
pub fn loop_clip(pose: Pose, profile: &PetProfile) -> String {
    let action = format!(
        "{}, first and last frame identical",
        loop_description(pose)
    );
    assemble(profile, &action, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn westie() -> PetProfile {
        PetProfile::new("West Highland terrier", "white", "dog")
    }

    #[test]
    fn prompts_mention_the_subject() {
        let prompt = base_pose(Pose::Sit, &westie());
        assert!(prompt.contains("white West Highland terrier dog"));
        assert!(prompt.contains("faces the dog"));
        assert!(!prompt.contains("{species}"));
    }

    #[test]
    fn clip_prompts_pin_the_camera() {
        let t = transition(Transition::SEEDS[1], &westie());
        assert!(t.contains("lies down"));
        assert!(t.contains(STATIC_CAMERA));
        assert!(loop_clip(Pose::Sleep, &westie()).contains("first and last frame identical"));
        assert!(!base_pose(Pose::Sleep, &westie()).contains(STATIC_CAMERA));
    }

    #[test]
    fn every_transition_has_its_own_motion() {
        let prompts: Vec<String> = Transition::all()
            .into_iter()
            .map(|t| transition(t, &westie()))
            .collect();
        assert_eq!(prompts.len(), 12);
        for (i, prompt) in prompts.iter().enumerate() {
            assert!(!prompt.contains("holds still"), "{prompt}");
            assert!(prompts[i + 1..].iter().all(|other| other != prompt));
        }
        let sit2sleep = transition("sit2sleep".parse().unwrap(), &westie());
        assert!(sit2sleep.contains("drops straight from sitting into sleep"));
    }

    #[test]
    fn empty_profile_still_reads() {
        let prompt = base_pose(Pose::Walk, &PetProfile::default());
        assert!(prompt.contains(", pet, "));
        assert!(prompt.contains("faces the pet"));
    }
}
