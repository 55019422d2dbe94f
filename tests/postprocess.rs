//! Clean-up of realistic vision-model replies.

use edgequake_page2md::pipeline::postprocess::clean_markdown;
use edgequake_page2md::{MarkedRegion, RegionPolicy};

fn regions() -> Vec<MarkedRegion> {
    vec![
        MarkedRegion::new("page_0_1.png", 0),
        MarkedRegion::new("page_0_2.png", 1),
    ]
}

#[test]
fn preamble_outside_the_fence_is_dropped_with_the_fence() {
    let reply = "Sure! Here is the transcription of the page:\r\n\
                 ```markdown\r\n\
                 # Results\r\n\
                 \r\n\
                 ![Figure 1](page_0_1.png)\r\n\
                 \r\n\r\n\r\n\
                 The measured ratio is $\\frac{a}{b}$.   \r\n\
                 \r\n\
                 ![page_0_2.png](images/page_0_2.png \"Figure 2\")\r\n\
                 ```";
    let cleaned = clean_markdown(reply, &regions(), &RegionPolicy::default());

    assert_eq!(
        cleaned.markdown,
        "# Results\n\n\
         ![page_0_1.png](page_0_1.png)\n\n\
         The measured ratio is $\\frac{a}{b}$.\n\n\
         ![page_0_2.png](page_0_2.png)"
    );
    assert!(cleaned.warnings.is_empty());
}

#[test]
fn forgotten_region_goes_before_its_content_paragraph() {
    let reply = "```markdown\n\
                 # Results\n\
                 \n\
                 ![Figure 1](page_0_1.png)\n\
                 The measured ratio is $\\frac{a}{b}$.\n\
                 ```";
    let cleaned = clean_markdown(reply, &regions(), &RegionPolicy::default());

    assert_eq!(
        cleaned.markdown,
        "# Results\n\n\
         ![page_0_1.png](page_0_1.png)\n\n\
         ![page_0_2.png](page_0_2.png)\n\n\
         The measured ratio is $\\frac{a}{b}$."
    );
    assert_eq!(cleaned.warnings.len(), 1);
    assert_eq!(cleaned.warnings[0].identifier(), "page_0_2.png");
}

#[test]
fn region_mentioned_twice_is_kept_once() {
    let reply = "Intro ![page_0_1.png](page_0_1.png) text.\n\n![page_0_1.png](page_0_1.png)";
    let cleaned = clean_markdown(reply, &regions()[..1], &RegionPolicy::default());

    assert_eq!(
        cleaned.markdown,
        "Intro\n\n![page_0_1.png](page_0_1.png)\n\ntext."
    );
    assert!(cleaned.warnings.is_empty());
}

#[test]
fn opening_sentence_with_a_courtesy_word_survives() {
    let reply = "Certainly, the committee rejected the motion.\n\nSecond paragraph.";
    let cleaned = clean_markdown(reply, &[], &RegionPolicy::default());
    assert_eq!(cleaned.markdown, reply);
}
